//! Credentials carried in config: the OAuth client secret, the bot token and
//! the CRM webhook URL, whose path embeds the access key.

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};

/// Owned secret text. `Debug` prints a placeholder, there is no `Display`.
pub struct SecretString {
    inner: SecretBox<str>,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: SecretBox::new(value.into().into_boxed_str()),
        }
    }

    /// Plain text, for building a request.
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
