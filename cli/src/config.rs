use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use chatmark_render::CodeTheme;
use chatmark_render::RenderSettings;
use toml_edit::DocumentMut;
use toml_edit::Item as TomlItem;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn new_default() -> anyhow::Result<Self> {
        let Some(home) = dirs::home_dir() else {
            anyhow::bail!("cannot determine home directory for config path");
        };
        Ok(Self::new(default_config_path(&home)))
    }

    /// Resolve render settings, falling back to defaults for anything missing or invalid.
    pub fn load_settings(&self) -> anyhow::Result<RenderSettings> {
        let mut settings = RenderSettings::default();
        let Some(content) = read_document_string(&self.path)? else {
            return Ok(settings);
        };

        let doc = match content.parse::<DocumentMut>() {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "config.toml is not valid TOML: {err}");
                if let Some(theme) = parse_code_theme_fallback(&content) {
                    settings.code_theme = theme;
                }
                return Ok(settings);
            }
        };

        if let Some(theme) = read_code_theme(&doc) {
            settings.code_theme = theme;
        }
        if let Some(width) = read_positive(&doc, "attachments", "compose_max_width") {
            settings.compose_max_width = width;
        }
        if let Some(width) = read_positive(&doc, "attachments", "transmit_max_width") {
            settings.transmit_max_width = width;
        }
        if let Some(period_ms) = read_positive(&doc, "pending", "period_ms") {
            settings.pending_period = Duration::from_millis(u64::from(period_ms));
        }
        Ok(settings)
    }
}

fn default_config_path(home: &Path) -> PathBuf {
    home.join(".chatmark").join("config.toml")
}

fn read_code_theme(doc: &DocumentMut) -> Option<CodeTheme> {
    let raw = doc
        .get("code_theme")
        .and_then(TomlItem::as_value)
        .and_then(|v| v.as_str())?;
    parse_theme_logged(raw)
}

fn parse_theme_logged(raw: &str) -> Option<CodeTheme> {
    match raw.parse() {
        Ok(theme) => Some(theme),
        Err(err) => {
            tracing::warn!("ignoring code_theme: {err}");
            None
        }
    }
}

/// A positive integer `key` inside `[table]`.
fn read_positive(doc: &DocumentMut, table: &str, key: &str) -> Option<u32> {
    let raw = doc
        .get(table)
        .and_then(TomlItem::as_table)
        .and_then(|t| t.get(key))
        .and_then(TomlItem::as_value)
        .and_then(|v| v.as_integer())?;
    match u32::try_from(raw) {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!("ignoring {table}.{key} = {raw}: expected a positive integer");
            None
        }
    }
}

fn parse_code_theme_fallback(contents: &str) -> Option<CodeTheme> {
    for line in contents.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            // Only top-level keys are recognized.
            return None;
        }
        let Some(line) = strip_toml_comment(trimmed) else {
            continue;
        };
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() != "code_theme" {
            continue;
        }

        let token = value.trim().trim_matches(|c| c == '"' || c == '\'');
        return parse_theme_logged(token);
    }

    None
}

fn strip_toml_comment(line: &str) -> Option<&str> {
    let line = line.split_once('#').map_or(line, |(head, _)| head).trim();
    if line.is_empty() { None } else { Some(line) }
}

fn read_document_string(path: &Path) -> anyhow::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow::Error::new(err).context("read config.toml")),
    }
}
