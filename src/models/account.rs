use serde::{Deserialize, Serialize};

/// Number of token characters shown in logs
const DISPLAY_PREFIX_CHARS: usize = 10;

/// One configured identity: a bearer token plus an optional raw proxy spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(skip_serializing)]
    pub token: String,
    pub proxy: Option<String>,
}

impl Account {
    pub fn new(token: impl Into<String>, proxy: Option<String>) -> Self {
        let proxy = proxy
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Self {
            token: token.into().trim().to_string(),
            proxy,
        }
    }

    /// Truncated token, safe to print
    pub fn display_id(&self) -> String {
        let prefix: String = self.token.chars().take(DISPLAY_PREFIX_CHARS).collect();
        format!("{}...", prefix)
    }
}
