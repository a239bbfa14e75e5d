use std::path::Path;

use anyhow::Context;
use tempfile::NamedTempFile;

/// Replace `path` with exactly `contents`, never leaving a half-written file behind.
pub fn write_atomic_text(path: &Path, contents: &str) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => anyhow::bail!("invalid path for atomic write: {}", path.display()),
    };
    std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent).context("create temp file")?;
    use std::io::Write as _;
    tmp.write_all(contents.as_bytes())
        .context("write temp file")?;
    tmp.flush().context("flush temp file")?;

    tmp.persist(path).map_err(|err| {
        anyhow::Error::new(err.error).context(format!("persist file to {}", path.display()))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_exact_contents_and_creates_parent_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("draft.txt");

        write_atomic_text(&path, "no trailing newline").expect("write atomic");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "no trailing newline"
        );

        write_atomic_text(&path, "replaced").expect("overwrite");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "replaced");
    }
}
