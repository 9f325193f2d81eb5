//! AwsSecretStore against a mocked Secrets Manager endpoint
//!
//! wiremock stands in for the service so the real SDK request/response
//! path is exercised without AWS access.


use aws_sdk_secretsmanager::config::retry::RetryConfig;
use aws_sdk_secretsmanager::config::{BehaviorVersion, Credentials, Region};
use mqtt_secrets::secrets::{load_bundle, AwsSecretStore, SecretStore, SecretsError};
use serde_json::json;
use test_helpers::BUNDLE_JSON;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AMZ_JSON: &str = "application/x-amz-json-1.1";

fn store_for(server: &MockServer) -> AwsSecretStore {
    let config = aws_sdk_secretsmanager::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
        .retry_config(RetryConfig::disabled())
        .endpoint_url(server.uri())
        .build();
    AwsSecretStore::from_conf(config)
}

fn get_secret_value() -> wiremock::MockBuilder {
    Mock::given(method("POST")).and(header("x-amz-target", "secretsmanager.GetSecretValue"))
}

#[tokio::test]
async fn test_fetches_secret_string_for_stage() {
    let server = MockServer::start().await;
    get_secret_value()
        .and(body_partial_json(
            json!({"SecretId": "test/mqtt", "VersionStage": "AWSCURRENT"}),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", AMZ_JSON)
                .set_body_json(json!({
                    "ARN": "arn:aws:secretsmanager:us-east-1:123456789012:secret:test/mqtt-AbCdEf",
                    "Name": "test/mqtt",
                    "SecretString": BUNDLE_JSON,
                    "VersionId": "00000000-0000-0000-0000-000000000001",
                    "VersionStages": ["AWSCURRENT"]
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let bundle = load_bundle(&store, "test/mqtt", "AWSCURRENT").await.unwrap();

    assert_eq!(
        bundle.value("mqtt_username").unwrap().as_deref(),
        Some("svc-bridge")
    );
    assert_eq!(bundle.value("port").unwrap().as_deref(), Some("8883"));
}

#[tokio::test]
async fn test_resource_not_found_maps_to_not_found() {
    let server = MockServer::start().await;
    get_secret_value()
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("content-type", AMZ_JSON)
                .set_body_json(json!({
                    "__type": "ResourceNotFoundException",
                    "message": "Secrets Manager can't find the specified secret."
                })),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let result = store.get_secret_string("missing/secret", "AWSCURRENT").await;

    assert!(matches!(
        result,
        Err(SecretsError::NotFound { secret_id }) if secret_id == "missing/secret"
    ));
}

#[tokio::test]
async fn test_access_denied_maps_to_fetch_error() {
    let server = MockServer::start().await;
    get_secret_value()
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("content-type", AMZ_JSON)
                .set_body_json(json!({
                    "__type": "AccessDeniedException",
                    "message": "User is not authorized to perform secretsmanager:GetSecretValue"
                })),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store
        .get_secret_string("test/mqtt", "AWSCURRENT")
        .await
        .unwrap_err();

    match err {
        SecretsError::Fetch { secret_id, message } => {
            assert_eq!(secret_id, "test/mqtt");
            assert!(message.contains("AccessDenied"), "message was: {message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_binary_secret_has_no_string_payload() {
    let server = MockServer::start().await;
    get_secret_value()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", AMZ_JSON)
                .set_body_json(json!({
                    "Name": "test/mqtt",
                    "SecretBinary": "AAEC",
                    "VersionStages": ["AWSCURRENT"]
                })),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert_eq!(
        store
            .get_secret_string("test/mqtt", "AWSCURRENT")
            .await
            .unwrap(),
        None
    );
    assert!(matches!(
        load_bundle(&store, "test/mqtt", "AWSCURRENT").await,
        Err(SecretsError::InvalidFormat { .. })
    ));
}
