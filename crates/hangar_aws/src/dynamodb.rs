use hangar_core::prelude::*;

use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

type Item = HashMap<String, AttributeValue>;

/// Job records as native DynamoDB items keyed by `id`.
///
/// Nested fields such as `config` are stored as maps, so the table stays
/// readable from the console.
#[derive(Clone, Debug)]
pub struct DynamoJobStore {
    client: DynamoClient,
    table: String,
}

impl DynamoJobStore {
    pub fn new(config: &aws_config::SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: DynamoClient::new(config),
            table: table.into(),
        }
    }
}

impl JobStore for DynamoJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let Value::Object(fields) = serde_json::to_value(job)? else {
            return Err(StoreError::Malformed(format!("Job {} is not an object", job.id)));
        };

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(fields)))
            .send()
            .await
            .map_err(|e| StoreError::System(format!("DynamoDB put_item failed: {e}")))?;

        debug!("Stored job {} as {}", job.id, job.state);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::System(format!("DynamoDB get_item failed: {e}")))?;

        let item = output
            .item()
            .ok_or_else(|| StoreError::NotFound(format!("Job {id}")))?;

        Ok(serde_json::from_value(from_item(item)?)?)
    }
}

/// The availability flag of each machine as `{name, available}` items.
#[derive(Clone, Debug)]
pub struct DynamoAvailability {
    client: DynamoClient,
    table: String,
}

impl DynamoAvailability {
    pub fn new(config: &aws_config::SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: DynamoClient::new(config),
            table: table.into(),
        }
    }

    fn key(name: &str) -> AttributeValue {
        AttributeValue::S(name.to_string())
    }
}

impl AvailabilityStore for DynamoAvailability {
    async fn set(&self, name: &str, available: bool) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item("name", Self::key(name))
            .item("available", AttributeValue::Bool(available))
            .send()
            .await
            .map_err(|e| StoreError::System(format!("DynamoDB put_item failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<bool, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("name", Self::key(name))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::System(format!("DynamoDB get_item failed: {e}")))?;

        let item = output
            .item()
            .ok_or_else(|| StoreError::NotFound(format!("Availability of {name}")))?;

        match item.get("available") {
            Some(AttributeValue::Bool(available)) => Ok(*available),
            other => Err(StoreError::Malformed(format!(
                "Availability of {name} is {other:?}"
            ))),
        }
    }

    async fn try_claim(&self, name: &str) -> Result<bool, StoreError> {
        let res = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("name", Self::key(name))
            .update_expression("SET available = :claimed")
            .condition_expression("available = :free")
            .expression_attribute_values(":claimed", AttributeValue::Bool(false))
            .expression_attribute_values(":free", AttributeValue::Bool(true))
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) if e.code() == Some("ConditionalCheckFailedException") => {
                // Either held by someone else or never registered.
                self.get(name).await.map(|_| false)
            }
            Err(e) => Err(StoreError::System(format!("DynamoDB update_item failed: {e}"))),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("name", Self::key(name))
            .send()
            .await
            .map_err(|e| StoreError::System(format!("DynamoDB delete_item failed: {e}")))?;
        Ok(())
    }
}

fn to_item(fields: Map<String, Value>) -> Item {
    fields
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key, to_attribute(value)))
        .collect()
}

fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => AttributeValue::L(values.into_iter().map(to_attribute).collect()),
        Value::Object(fields) => AttributeValue::M(to_item(fields)),
    }
}

fn from_item(item: &Item) -> Result<Value, StoreError> {
    item.iter()
        .map(|(key, value)| Ok((key.clone(), from_attribute(value)?)))
        .collect::<Result<Map<_, _>, StoreError>>()
        .map(Value::Object)
}

fn from_attribute(value: &AttributeValue) -> Result<Value, StoreError> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => Value::Number(
            n.parse::<Number>()
                .map_err(|e| StoreError::Malformed(format!("Number {n}: {e}")))?,
        ),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(fields) => from_item(fields)?,
        other => {
            return Err(StoreError::Malformed(format!(
                "Unsupported attribute {other:?}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn job() -> Job {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut job = Job::new(
            JobConfig {
                command: "make test".into(),
                output_dir: "s3://artifacts/ci".into(),
                machine_name: "builder".into(),
            },
            now,
        );
        job.start("i-0abc", "cmd-1", now).unwrap();
        job
    }

    #[test]
    fn test_item_layout() {
        let job = job();
        let Value::Object(fields) = serde_json::to_value(&job).unwrap() else {
            panic!("not an object");
        };
        let item = to_item(fields);

        assert_eq!(item["id"], AttributeValue::S(job.id.to_string()));
        assert_eq!(item["state"], AttributeValue::S("INPROGRESS".into()));
        assert_eq!(
            item["created_at"],
            AttributeValue::S("2026-03-01T12:00:00".into())
        );
        assert!(!item.contains_key("done_at"));

        let AttributeValue::M(config) = &item["config"] else {
            panic!("config is not a map");
        };
        assert_eq!(config["machine_name"], AttributeValue::S("builder".into()));
    }

    #[test]
    fn test_item_decodes_back() {
        let job = job();
        let Value::Object(fields) = serde_json::to_value(&job).unwrap() else {
            panic!("not an object");
        };
        let decoded: Job = serde_json::from_value(from_item(&to_item(fields)).unwrap()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_unsupported_attribute() {
        let item = HashMap::from([(
            "tags".to_string(),
            AttributeValue::Ss(vec!["a".into()]),
        )]);
        assert!(matches!(from_item(&item), Err(StoreError::Malformed(_))));
    }
}
