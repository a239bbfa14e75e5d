//! Outgoing text transform applied once when a composed message is sent.

use regex::Captures;

use crate::image_tag::DualTagCaptures;
use crate::image_tag::dual_tag_regex;

/// Collapse every dual-size image tag in `text` to its canonical, transmit-sized form.
///
/// Only the exact six-field grammar is rewritten; the `src`/`alt` text is copied verbatim. Any
/// other tag (already canonical, hand-written, or from another client) is left byte-for-byte.
pub fn finalize(text: &str) -> String {
    dual_tag_regex()
        .replace_all(text, |caps: &Captures<'_>| match DualTagCaptures::from_captures(caps) {
            Some(dims) => format!(
                r#"<img src="{src}" alt="{alt}" width="{width}" height="{height}">"#,
                src = dims.src,
                alt = dims.alt,
                width = dims.transmit_width,
                height = dims.transmit_height,
            ),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_tag::ImageSize;
    use crate::image_tag::ImageTagRecord;
    use pretty_assertions::assert_eq;

    #[test]
    fn collapses_dual_tag_to_transmit_size() {
        let text = r#"look: <img src="data:image/png;base64,AAAA" alt="a.png" width="70" height="35" data-original-width="600" data-original-height="300"> nice"#;
        assert_eq!(
            finalize(text),
            r#"look: <img src="data:image/png;base64,AAAA" alt="a.png" width="600" height="300"> nice"#
        );
    }

    #[test]
    fn canonical_tag_is_byte_identical() {
        let text = r#"<img src="https://example.com/a.png" alt="a" width="600" height="300">"#;
        assert_eq!(finalize(text), text);
    }

    #[test]
    fn foreign_tags_pass_through() {
        let text = concat!(
            r#"<img src="a" alt="b" data-original-width="600" width="70" height="35" data-original-height="300">"#,
            "\n",
            r#"<img alt="b" src="a" width="70" height="35" data-original-width="600" data-original-height="300">"#,
            "\n",
            r#"<img src='a' alt='b' width='70' height='35'>"#,
        );
        assert_eq!(finalize(text), text);
    }

    #[test]
    fn rewrites_every_tag_and_keeps_escaped_alt() {
        let first = ImageTagRecord {
            src: "data:image/jpeg;base64,/9j/".to_string(),
            alt: "\"quoted\"".to_string(),
            compose: ImageSize::new(70, 70),
            transmit: ImageSize::new(512, 512),
        };
        let second = ImageTagRecord {
            src: "/b.png".to_string(),
            alt: "b".to_string(),
            compose: ImageSize::new(70, 10),
            transmit: ImageSize::new(600, 86),
        };
        let text = format!("{}\n\n{}", first.to_dual_tag(), second.to_dual_tag());
        assert_eq!(
            finalize(&text),
            format!("{}\n\n{}", first.to_canonical_tag(), second.to_canonical_tag())
        );
    }

    #[test]
    fn finalize_is_stable_on_its_output() {
        let text = r#"<img src="s" alt="a" width="1" height="2" data-original-width="3" data-original-height="4">"#;
        let once = finalize(text);
        assert_eq!(finalize(&once), once);
    }
}
