use serde::Deserialize;
use serde_json::Value;

/// Body of a successful `/oauth/token` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Each field is read on its own: a mistyped field comes back as `None`
    /// and never costs the others. A body that is not JSON yields all `None`.
    pub fn from_body(body: &str) -> Self {
        let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let expires_in = match value.get("expires_in") {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Self {
            access_token: text("access_token"),
            refresh_token: text("refresh_token"),
            expires_in,
            token_type: text("token_type"),
        }
    }
}

/// Body of a failed `/oauth/token` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    pub fn describe(&self, fallback: &str) -> String {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => format!("{error}: {description}"),
            (Some(error), None) => error.clone(),
            (None, Some(description)) => description.clone(),
            (None, None) => fallback.to_string(),
        }
    }
}
