use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON error body returned by the platform on failed requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Decodes an error body, keeping the raw text when it is not the platform's JSON shape.
    pub fn from_body(body: &str) -> Option<Self> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<Self>(trimmed) {
            Ok(parsed) if !parsed.message.is_empty() => Some(parsed),
            _ => Some(Self::new(0, trimmed.chars().take(200).collect::<String>())),
        }
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (code {})", self.message, self.code)
        }
    }
}
