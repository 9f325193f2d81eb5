//! Marker substitution over an environment snapshot
//!
//! A variable such as `MQTT_PASSWORD=!mqtt_password` is a reference to the
//! `mqtt_password` key of the secret bundle. Substitution works on a
//! snapshot ([`ResolvedEnv`]) and never writes back to the process
//! environment, so the rest of the program reads settings from the snapshot.

use super::{load_bundle, SecretBundle, SecretStore, SecretsError};
use crate::config::SecretsSection;
use crate::error::BridgeError;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, Instrument};

/// Errors raised while applying marker substitution
#[derive(Debug, Error)]
pub enum SubstitutionError {
    #[error("Variable {variable} holds a bare marker with no secret key")]
    EmptyKey { variable: String },
    #[error("Secret bundle has no keys for variables: {}", .variables.join(", "))]
    MissingKeys { variables: Vec<String> },
    #[error("Variable {variable}: {source}")]
    UnsupportedValue {
        variable: String,
        #[source]
        source: SecretsError,
    },
}

/// Environment snapshot after marker substitution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedEnv {
    vars: BTreeMap<String, String>,
    substituted: Vec<String>,
}

impl ResolvedEnv {
    /// Snapshot the current process environment.
    ///
    /// Entries whose name or value is not valid UTF-8 are skipped.
    pub fn capture_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Self::from_vars(vars)
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            substituted: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Names of variables whose value came from the secret bundle, in name order
    pub fn substituted(&self) -> &[String] {
        &self.substituted
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Replace every marker-prefixed value with the bundle value it names.
///
/// Only the leading marker is stripped. Missing keys are collected across all
/// variables and reported together.
pub fn substitute_markers(
    env: &ResolvedEnv,
    bundle: &SecretBundle,
    marker: char,
) -> Result<ResolvedEnv, SubstitutionError> {
    let mut vars = BTreeMap::new();
    let mut substituted = Vec::new();
    let mut missing = Vec::new();

    for (name, value) in &env.vars {
        let Some(key) = value.strip_prefix(marker) else {
            vars.insert(name.clone(), value.clone());
            continue;
        };

        if key.is_empty() {
            return Err(SubstitutionError::EmptyKey {
                variable: name.clone(),
            });
        }

        match bundle.value(key) {
            Ok(Some(secret)) => {
                debug!(variable = %name, key, "Substituted variable from secret bundle");
                vars.insert(name.clone(), secret);
                substituted.push(name.clone());
            }
            Ok(None) => missing.push(name.clone()),
            Err(source) => {
                return Err(SubstitutionError::UnsupportedValue {
                    variable: name.clone(),
                    source,
                })
            }
        }
    }

    if !missing.is_empty() {
        return Err(SubstitutionError::MissingKeys { variables: missing });
    }

    Ok(ResolvedEnv { vars, substituted })
}

/// Fetch the bundle named by `section` and apply substitution to `env`
pub async fn resolve_environment<S>(
    store: &S,
    section: &SecretsSection,
    env: &ResolvedEnv,
) -> Result<ResolvedEnv, BridgeError>
where
    S: SecretStore + ?Sized,
{
    let secret_id = section.resolve_secret_name(env)?;
    let span = crate::secrets_span!(secret_id = %secret_id, version_stage = %section.version_stage);

    async {
        let bundle = load_bundle(store, &secret_id, &section.version_stage).await?;
        debug!(keys = bundle.len(), "Secret bundle fetched");

        let resolved = substitute_markers(env, &bundle, section.marker)?;
        info!(
            substituted = resolved.substituted().len(),
            "Secrets loaded"
        );
        Ok::<_, BridgeError>(resolved)
    }
    .instrument(span)
    .await
}
