//! Common types and utilities for the ArcGIS REST API

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::{ApiError, Result};

/// Error codes the portal uses for a missing or invalid token.
pub const TOKEN_ERROR_CODES: [i64; 2] = [498, 499];

/// The `error` object the portal embeds in otherwise successful HTTP responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRemoteError")]
pub struct RemoteError {
    #[serde(with = "string_or_i64")]
    pub code: Option<i64>,
    pub message: String,
    pub details: Vec<String>,
}

/// Wire shape of an error object. Per-feature edit errors carry their text as
/// `description` instead of `message`.
#[derive(Deserialize)]
struct RawRemoteError {
    #[serde(default, with = "string_or_i64")]
    code: Option<i64>,
    message: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    details: Vec<String>,
}

impl From<RawRemoteError> for RemoteError {
    fn from(raw: RawRemoteError) -> Self {
        Self {
            code: raw.code,
            message: raw.message.or(raw.description).unwrap_or_default(),
            details: raw.details,
        }
    }
}

impl RemoteError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Error for a response that carried neither an `error` object nor the expected field.
    pub fn missing_field(field: &str) -> Self {
        Self::new(None, format!("response did not include `{}`", field))
    }

    pub fn is_token_error(&self) -> bool {
        self.code
            .map(|code| TOKEN_ERROR_CODES.contains(&code))
            .unwrap_or(false)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if !self.details.is_empty() {
            write!(f, " ({})", self.details.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Pull the portal's `error` object out of a response, if there is one.
///
/// An `error` member that does not look like an error object still counts as an
/// error; its raw text becomes the message.
pub fn remote_error(value: &Value) -> Option<RemoteError> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        serde_json::from_value::<RemoteError>(error.clone())
            .unwrap_or_else(|_| RemoteError::new(None, error.to_string())),
    )
}

/// Reject a response carrying an `error` object.
///
/// Token errors always surface as [`ApiError::Auth`]; everything else goes through `wrap`.
pub fn check_response(value: Value, wrap: fn(RemoteError) -> ApiError) -> Result<Value> {
    match remote_error(&value) {
        Some(err) => {
            tracing::error!("Portal returned error: {}", err);
            Err(classify(err, wrap))
        }
        None => Ok(value),
    }
}

pub fn classify(err: RemoteError, wrap: fn(RemoteError) -> ApiError) -> ApiError {
    if err.is_token_error() {
        ApiError::Auth(err)
    } else {
        wrap(err)
    }
}

/// Deserialize an already error-checked response into a typed record.
pub fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!("Failed to deserialize {}: {}", what, e);
        ApiError::MalformedResponse(format!("unexpected {} shape: {}", what, e))
    })
}

/// Ordered form fields for a portal request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormParams {
    params: Vec<(String, String)>,
}

impl FormParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a form with the response format field set.
    pub fn format(f: &str) -> Self {
        Self::new().add("f", f)
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    /// Add a structured value encoded as JSON text.
    pub fn add_json<K: Into<String>, V: Serialize + ?Sized>(
        self,
        key: K,
        value: &V,
    ) -> Result<Self> {
        let encoded = serde_json::to_string(value)?;
        Ok(self.add(key, encoded))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.params
    }

    /// Encoded form body with credentials masked, for logging.
    pub fn redacted(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| {
                if k == "token" || k == "password" {
                    format!("{}=***", k)
                } else {
                    format!("{}={}", k, urlencoding::encode(v))
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub mod string_or_i64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrI64 {
            String(String),
            I64(i64),
        }

        match Option::<StringOrI64>::deserialize(deserializer)? {
            Some(StringOrI64::String(s)) => {
                s.trim().parse::<i64>().map(Some).map_err(serde::de::Error::custom)
            }
            Some(StringOrI64::I64(i)) => Ok(Some(i)),
            None => Ok(None),
        }
    }
}
