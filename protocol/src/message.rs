use serde::Deserialize;
use serde::Serialize;

/// Author name used for model-produced messages.
pub const MODEL_AUTHOR: &str = "AI";

/// A single chat message as exchanged with the message store.
///
/// Rendering only ever reads `text`; the send path replaces it with canonical text before the
/// message leaves the composer.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub author: String,
    pub name: String,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Message {
    pub fn new(author: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
            name: name.into(),
            is_hidden: false,
        }
    }

    /// Whether the message exists but no content has streamed in yet.
    pub fn is_pending(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_from_model(&self) -> bool {
        self.author == MODEL_AUTHOR
    }

    /// Append a streamed token to a model message.
    pub fn append_streamed(&mut self, delta: &str) {
        self.text.push_str(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_format_uses_camel_case() {
        let message = Message {
            is_hidden: true,
            ..Message::new("alice", "message_1", "hi")
        };
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "text": "hi",
                "author": "alice",
                "name": "message_1",
                "isHidden": true,
            })
        );
    }

    #[test]
    fn missing_is_hidden_defaults_to_false() {
        let message: Message =
            serde_json::from_str(r#"{"text":"","author":"AI","name":"m"}"#).expect("deserialize");
        assert!(!message.is_hidden);
        assert!(message.is_pending());
        assert!(message.is_from_model());
    }

    #[test]
    fn streamed_tokens_accumulate() {
        let mut message = Message::new(MODEL_AUTHOR, "m", "");
        message.append_streamed("Hel");
        message.append_streamed("lo");
        assert_eq!(message.text, "Hello");
        assert!(!message.is_pending());
    }
}
