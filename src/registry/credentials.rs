//! Login/token credential schema shared by Hub-style registries

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::error::ConfigError;

/// Either a login+token pair or a pre-encoded `auth` string, never both.
/// All fields absent means anonymous access.
#[derive(Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BasicCredentials {
    pub login: Option<String>,
    #[serde(alias = "password")]
    pub token: Option<String>,
    pub auth: Option<String>,
}

impl BasicCredentials {
    pub fn validate(self, provider: &str) -> Result<Self, ConfigError> {
        match (&self.login, &self.token, &self.auth) {
            (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => Err(ConfigError::registry(
                provider,
                "auth is mutually exclusive with login/token",
            )),
            (Some(_), None, None) => Err(ConfigError::registry(provider, "login requires a token")),
            (None, Some(_), None) => Err(ConfigError::registry(provider, "token requires a login")),
            (None, None, Some(auth)) => {
                let decoded = BASE64
                    .decode(auth)
                    .map_err(|e| ConfigError::registry(provider, format!("auth is not valid base64: {e}")))?;
                if !decoded.contains(&b':') {
                    return Err(ConfigError::registry(provider, "auth must encode login:token"));
                }
                Ok(self)
            }
            _ => Ok(self),
        }
    }

    /// Pre-encoded value if configured, else login:token encoded, else None
    pub fn encoded(&self) -> Option<String> {
        if let Some(auth) = &self.auth {
            return Some(auth.clone());
        }
        match (&self.login, &self.token) {
            (Some(login), Some(token)) => Some(encode_pair(login, token)),
            _ => None,
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("login", &self.login)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// base64 of `login:secret`
pub fn encode_pair(login: &str, secret: &str) -> String {
    BASE64.encode(format!("{login}:{secret}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> BasicCredentials {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"login": "user", "token": "secret"}))]
    #[case(json!({"login": "user", "password": "secret"}))]
    #[case(json!({"auth": "dXNlcjpzZWNyZXQ="}))]
    fn validate_accepts_complete_credentials(#[case] value: serde_json::Value) {
        assert!(parse(value).validate("hub").is_ok());
    }

    #[rstest]
    #[case(json!({"login": "user"}))]
    #[case(json!({"token": "secret"}))]
    #[case(json!({"login": "user", "token": "secret", "auth": "dXNlcjpzZWNyZXQ="}))]
    #[case(json!({"token": "secret", "auth": "dXNlcjpzZWNyZXQ="}))]
    #[case(json!({"auth": "%%%not-base64"}))]
    #[case(json!({"auth": "bm9jb2xvbg=="}))] // "nocolon"
    fn validate_rejects_incomplete_or_conflicting_credentials(#[case] value: serde_json::Value) {
        assert!(matches!(
            parse(value).validate("hub"),
            Err(ConfigError::InvalidRegistry { .. })
        ));
    }

    #[test]
    fn encoded_prefers_pre_encoded_auth() {
        let credentials = parse(json!({"auth": "dXNlcjpzZWNyZXQ="}));
        assert_eq!(credentials.encoded().as_deref(), Some("dXNlcjpzZWNyZXQ="));
    }

    #[test]
    fn encoded_assembles_login_and_token() {
        let credentials = parse(json!({"login": "user", "token": "secret"}));
        assert_eq!(credentials.encoded().as_deref(), Some("dXNlcjpzZWNyZXQ="));
    }

    #[test]
    fn encoded_is_none_for_anonymous_access() {
        assert_eq!(BasicCredentials::default().encoded(), None);
    }

    #[test]
    fn debug_redacts_secrets() {
        let credentials = parse(json!({"login": "user", "token": "secret"}));
        let output = format!("{credentials:?}");
        assert!(output.contains("user"));
        assert!(!output.contains("secret"));
    }
}
