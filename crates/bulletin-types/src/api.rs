use serde::{Deserialize, Serialize};

// -- Public messages API --

#[derive(Debug, Deserialize)]
pub struct PublicMessagesQuery {
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMessage {
    pub title: String,
    pub message: String,
}

/// Body of every `/api/messages` response, including the error cases.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicMessagesResponse {
    #[serde(rename = "yourDomain")]
    pub your_domain: String,
    pub messages: Vec<PublicMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublicMessagesResponse {
    pub fn new(your_domain: impl Into<String>) -> Self {
        Self {
            your_domain: your_domain.into(),
            messages: Vec::new(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

// -- Misc --

#[derive(Debug, Deserialize)]
pub struct SetLanguageQuery {
    #[serde(default)]
    pub lang: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    #[serde(default)]
    pub token: String,
}
