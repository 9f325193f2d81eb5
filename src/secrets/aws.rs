//! AWS Secrets Manager backed [`SecretStore`]

use super::{SecretStore, SecretsError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::config::Region;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client;
use tracing::debug;

/// Secret store backed by the `GetSecretValue` API
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: Client,
}

impl AwsSecretStore {
    /// Build a store from the AWS default credential and region chain.
    ///
    /// `region` overrides whatever the chain would pick (`AWS_REGION`, profile, IMDS).
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    /// Build a store from an explicit service configuration
    pub fn from_conf(config: aws_sdk_secretsmanager::Config) -> Self {
        Self {
            client: Client::from_conf(config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret_string(
        &self,
        secret_id: &str,
        version_stage: &str,
    ) -> Result<Option<String>, SecretsError> {
        debug!(secret_id, version_stage, "Requesting secret value");

        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(version_stage)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());
                if not_found {
                    SecretsError::NotFound {
                        secret_id: secret_id.to_string(),
                    }
                } else {
                    SecretsError::Fetch {
                        secret_id: secret_id.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        Ok(output.secret_string().map(str::to_string))
    }
}
