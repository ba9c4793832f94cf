//! Access token held by the dispatcher.
//!
//! The token, its type and its expiry always travel together in one
//! [`Credential`] value. Replacing or clearing credentials swaps the whole
//! value, so a reader building an `Authorization` header never observes a
//! token from one refresh paired with the expiry of another.

use std::fmt;

use jiff::{SignedDuration, Timestamp};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// OAuth 2.0 bearer token, sent as `Authorization: Bearer <token>`.
    #[serde(alias = "OAuth2", alias = "bearer")]
    Bearer,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,
    token_type: TokenType,
    expires_at: Timestamp,
}

impl Credential {
    pub fn new(token: impl Into<String>, token_type: TokenType, expires_at: Timestamp) -> Self {
        Self {
            token: token.into(),
            token_type,
            expires_at,
        }
    }

    /// Convenience for `Bearer` tokens expiring `ttl` from now.
    pub fn bearer_expiring_in(token: impl Into<String>, ttl: SignedDuration) -> Self {
        Self::new(token, TokenType::Bearer, Timestamp::now() + ttl)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Time left before expiry; negative once the token has expired.
    pub fn remaining(&self, now: Timestamp) -> SignedDuration {
        self.expires_at.duration_since(now)
    }

    /// Value for the `Authorization` header, if this credential yields one.
    pub fn authorization_header(&self) -> Option<HeaderValue> {
        if self.token.is_empty() {
            return None;
        }
        match self.token_type {
            TokenType::Bearer => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token)).ok()?;
                value.set_sensitive(true);
                Some(value)
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_formats_token() {
        let credential = Credential::bearer_expiring_in("at_abc", SignedDuration::from_secs(60));
        let header = credential.authorization_header().expect("header");
        assert_eq!(header.to_str().unwrap(), "Bearer at_abc");
        assert!(header.is_sensitive());
    }

    #[test]
    fn empty_token_yields_no_header() {
        let credential = Credential::bearer_expiring_in("", SignedDuration::from_secs(60));
        assert!(credential.authorization_header().is_none());
    }

    #[test]
    fn token_with_control_characters_yields_no_header() {
        let credential = Credential::bearer_expiring_in("bad\ntoken", SignedDuration::from_secs(60));
        assert!(credential.authorization_header().is_none());
    }

    #[test]
    fn remaining_goes_negative_after_expiry() {
        let now = Timestamp::now();
        let credential = Credential::new("t", TokenType::Bearer, now - SignedDuration::from_secs(5));
        assert!(credential.remaining(now).is_negative());
    }

    #[test]
    fn stored_credential_accepts_oauth2_alias() {
        let json = r#"{"token":"at_1","token_type":"OAuth2","expires_at":"2030-01-01T00:00:00Z"}"#;
        let credential: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.token_type(), TokenType::Bearer);
        assert_eq!(credential.expires_at().to_string(), "2030-01-01T00:00:00Z");
    }

    #[test]
    fn debug_redacts_token() {
        let credential = Credential::bearer_expiring_in("secret", SignedDuration::from_secs(60));
        assert!(!format!("{credential:?}").contains("secret"));
    }
}
