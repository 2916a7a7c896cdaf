use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenParseError {
    #[error("token response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("token response must be a JSON object")]
    InvalidPayloadType,
    #[error("token response is missing {0}")]
    MissingField(&'static str),
}

const ACCESS_TOKEN_KEY: &str = "token";
const REFRESH_TOKEN_KEY: &str = "refreshToken";

pub fn parse_token_response(body: &str) -> Result<CredentialPair, TokenParseError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|err| TokenParseError::InvalidJson(err.to_string()))?;
    let object = payload
        .as_object()
        .ok_or(TokenParseError::InvalidPayloadType)?;

    Ok(CredentialPair {
        access_token: required_token(object, ACCESS_TOKEN_KEY)?,
        refresh_token: required_token(object, REFRESH_TOKEN_KEY)?,
    })
}

fn required_token(object: &Map<String, Value>, key: &'static str) -> Result<String, TokenParseError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .ok_or(TokenParseError::MissingField(key))
}

#[cfg(test)]
mod tests {
    use super::{CredentialPair, TokenParseError, parse_token_response};

    #[test]
    fn parses_token_pair_from_refresh_response() {
        let pair = parse_token_response(r#"{"token":"access-2","refreshToken":"refresh-2"}"#)
            .expect("response should parse");

        assert_eq!(pair, CredentialPair::new("access-2", "refresh-2"));
    }

    #[test]
    fn rejects_response_without_refresh_token() {
        let result = parse_token_response(r#"{"token":"access-2"}"#);

        assert_eq!(result, Err(TokenParseError::MissingField("refreshToken")));
    }

    #[test]
    fn rejects_empty_access_token() {
        let result = parse_token_response(r#"{"token":"  ","refreshToken":"refresh-2"}"#);

        assert_eq!(result, Err(TokenParseError::MissingField("token")));
    }

    #[test]
    fn rejects_non_object_and_invalid_json() {
        assert_eq!(
            parse_token_response("[]"),
            Err(TokenParseError::InvalidPayloadType)
        );
        assert!(matches!(
            parse_token_response("<html>bad gateway</html>"),
            Err(TokenParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let pair = CredentialPair::new("secret-access", "secret-refresh");
        let rendered = format!("{pair:?}");

        assert!(!rendered.contains("secret"));
    }
}
