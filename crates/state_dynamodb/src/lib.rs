use async_trait::async_trait;
use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::get_item::{GetItemError, GetItemOutput};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemError, UpdateItemOutput};
use aws_sdk_dynamodb::types::AttributeValue;
use model::record::WorkflowRecord;
use serde_json::{Map, Value};
use state::StateErrorReason::{BackendFailure, BadRecord, MissingRecord};
use state::StateOperation::{GetRecord, UpdateRecord};
use state::{RecordStore, StateError};
use std::collections::HashMap;

const GUID: &str = "guid";

/// `RecordStore` backed by a single DynamoDB table with `guid` as the
/// partition key. Updates build a `SET` expression from the given fields so
/// concurrent steps only touch the attributes they own.
pub struct DynamoDbRecordStore {
    table_name: String,
    dynamodb_client: aws_sdk_dynamodb::Client,
    consistent_read: bool,
}

impl DynamoDbRecordStore {
    pub fn new(dynamodb_client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        DynamoDbRecordStore {
            table_name,
            dynamodb_client,
            consistent_read: true,
        }
    }
}

#[async_trait]
impl RecordStore for DynamoDbRecordStore {
    async fn get_record(&self, guid: &str) -> Result<WorkflowRecord, StateError> {
        let output: GetItemOutput = self.get_item(guid).await.map_err(|err| {
            StateError::new(guid.to_string(), GetRecord, BackendFailure(err.into()))
        })?;

        let item: HashMap<String, AttributeValue> = output
            .item
            .ok_or_else(|| StateError::new(guid.to_string(), GetRecord, MissingRecord))?;

        serde_dynamo::from_item(item).map_err(|err| {
            StateError::new(guid.to_string(), GetRecord, BadRecord(err.to_string()))
        })
    }

    async fn update_record(
        &self,
        guid: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StateError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut expression: Vec<String> = Vec::with_capacity(fields.len());
        let mut names: HashMap<String, String> = HashMap::with_capacity(fields.len());
        let mut values: HashMap<String, AttributeValue> = HashMap::with_capacity(fields.len());

        for (i, (key, value)) in fields.into_iter().enumerate() {
            // The key itself is immutable
            if key == GUID {
                continue;
            }

            let attribute: AttributeValue = serde_dynamo::to_attribute_value(value)
                .map_err(|err| {
                    StateError::new(guid.to_string(), UpdateRecord, BadRecord(err.to_string()))
                })?;

            expression.push(format!("#k{i} = :v{i}"));
            names.insert(format!("#k{i}"), key);
            values.insert(format!(":v{i}"), attribute);
        }

        if expression.is_empty() {
            return Ok(());
        }

        self.update_item(guid, format!("SET {}", expression.join(", ")), names, values)
            .await
            .map_err(|err| {
                StateError::new(guid.to_string(), UpdateRecord, BackendFailure(err.into()))
            })?;

        Ok(())
    }
}

impl DynamoDbRecordStore {
    async fn get_item(
        &self,
        guid: &str,
    ) -> Result<GetItemOutput, SdkError<GetItemError, HttpResponse>> {
        self.dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .consistent_read(self.consistent_read)
            .key(GUID, AttributeValue::S(guid.to_string()))
            .send()
            .await
    }

    async fn update_item(
        &self,
        guid: &str,
        expression: String,
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError, HttpResponse>> {
        self.dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .key(GUID, AttributeValue::S(guid.to_string()))
            .update_expression(expression)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .send()
            .await
    }
}
