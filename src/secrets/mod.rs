//! Secret bundle retrieval
//!
//! A secret bundle is a JSON object stored as the string payload of a
//! secret. The [`SecretStore`] trait abstracts the store so the AWS
//! implementation can be swapped for a mock in tests.

pub mod aws;
pub mod markers;

pub use aws::AwsSecretStore;
pub use markers::{resolve_environment, substitute_markers, ResolvedEnv, SubstitutionError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised while fetching or parsing a secret bundle
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Secret not found: {secret_id}")]
    NotFound { secret_id: String },
    #[error("Failed to fetch secret {secret_id}: {message}")]
    Fetch { secret_id: String, message: String },
    #[error("Secret does not have a valid format: {secret_id} has no string payload")]
    InvalidFormat { secret_id: String },
    #[error("Secret payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Secret payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("Secret key '{key}' holds an unsupported {kind} value")]
    UnsupportedValue { key: String, kind: &'static str },
}

/// Source of secret payloads
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the string payload of a secret at the given version stage.
    ///
    /// Returns `Ok(None)` when the secret exists but only carries binary data.
    async fn get_secret_string(
        &self,
        secret_id: &str,
        version_stage: &str,
    ) -> Result<Option<String>, SecretsError>;
}

/// Parsed key/value credential pairs
#[derive(Clone, Default, PartialEq)]
pub struct SecretBundle {
    entries: Map<String, Value>,
}

impl SecretBundle {
    /// Parse a secret payload, which must be a JSON object
    pub fn parse(payload: &str) -> Result<Self, SecretsError> {
        let value: Value = serde_json::from_str(payload).map_err(SecretsError::InvalidJson)?;
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(SecretsError::NotAnObject(json_kind(&other))),
        }
    }

    /// Look up a key as an environment-ready string.
    ///
    /// Strings are returned verbatim, numbers and booleans as their JSON text.
    pub fn value(&self, key: &str) -> Result<Option<String>, SecretsError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Some(other) => Err(SecretsError::UnsupportedValue {
                key: key.to_string(),
                kind: json_kind(other),
            }),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Values stay out of logs and panic messages.
impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Fetch and parse the secret bundle
pub async fn load_bundle<S>(
    store: &S,
    secret_id: &str,
    version_stage: &str,
) -> Result<SecretBundle, SecretsError>
where
    S: SecretStore + ?Sized,
{
    let payload = store
        .get_secret_string(secret_id, version_stage)
        .await?
        .ok_or_else(|| SecretsError::InvalidFormat {
            secret_id: secret_id.to_string(),
        })?;

    SecretBundle::parse(&payload)
}
