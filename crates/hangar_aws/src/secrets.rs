use hangar_core::prelude::*;

use aws_sdk_secretsmanager::Client as SecretsClient;
use aws_sdk_secretsmanager::error::ProvideErrorMetadata;
use serde_json::Value;
use std::collections::HashMap;

/// Secrets Manager entries holding a flat JSON object, e.g. webhook settings.
#[derive(Clone, Debug)]
pub struct AwsSecrets {
    client: SecretsClient,
}

impl AwsSecrets {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: SecretsClient::new(config),
        }
    }
}

impl SecretStore for AwsSecrets {
    async fn load(&self, name: &str) -> Result<HashMap<String, String>, SecretError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("ResourceNotFoundException") => SecretError::NotFound(name.to_string()),
                _ => SecretError::System(format!("Secrets Manager error for {name}: {e}")),
            })?;

        let raw = match (output.secret_string(), output.secret_binary()) {
            (Some(text), _) => text.as_bytes().to_vec(),
            (None, Some(blob)) => blob.as_ref().to_vec(),
            (None, None) => return Err(SecretError::Malformed(format!("{name} is empty"))),
        };

        parse_secret(name, &raw)
    }
}

fn parse_secret(name: &str, raw: &[u8]) -> Result<HashMap<String, String>, SecretError> {
    let Value::Object(fields) = serde_json::from_slice(raw)
        .map_err(|e| SecretError::Malformed(format!("{name}: {e}")))?
    else {
        return Err(SecretError::Malformed(format!("{name} is not a JSON object")));
    };

    fields
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            other => Err(SecretError::Malformed(format!(
                "{name}.{key} is not a string: {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secret() {
        let secret = parse_secret(
            "hangar",
            br#"{"webhook_url": "https://hooks.example.com/x", "username": "ci"}"#,
        )
        .unwrap();
        assert_eq!(secret["username"], "ci");

        assert!(matches!(
            parse_secret("hangar", br#"{"port": 3000}"#),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            parse_secret("hangar", b"[1, 2]"),
            Err(SecretError::Malformed(_))
        ));
    }
}
