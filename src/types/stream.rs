//! The uniform streaming envelope emitted by every provider adapter.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Why a model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Completed naturally.
    ///
    /// Maps to OpenAI `stop`, Gemini `STOP`, Ollama `stop`.
    Stop,
    /// Hit the output token limit.
    ///
    /// Maps to OpenAI `length`, Gemini `MAX_TOKENS`, Ollama `length`.
    Length,
    /// Filtered for safety or policy reasons.
    ///
    /// Maps to OpenAI `content_filter`, Gemini `SAFETY` / `RECITATION` / `PROHIBITED_CONTENT`.
    ContentFilter,
    /// Any other provider-specific reason, passed through verbatim.
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::Other(reason) => reason,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for FinishReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let reason = String::deserialize(deserializer)?;
        Ok(Self::from(reason.as_str()))
    }
}

/// A single increment of a model response.
///
/// A stream carries any number of non-terminal deltas followed by exactly one
/// terminal delta (`done == true`, `finish_reason` set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDelta {
    pub token: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamDelta {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            done: false,
            finish_reason: None,
        }
    }

    pub fn terminal(reason: FinishReason) -> Self {
        Self {
            token: String::new(),
            done: true,
            finish_reason: Some(reason),
        }
    }

    pub const fn is_terminal(&self) -> bool {
        self.done
    }
}
