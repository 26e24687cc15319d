use crate::protocol::CustomResourceRequest;
use crate::LifecycleError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// The kinds of dependent resources this deployment manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Endpoint,
    JobTemplates,
    PackagingGroup,
}

impl ResourceKind {
    pub fn parse(resource: &str) -> Option<Self> {
        match resource {
            "EndPoint" => Some(ResourceKind::Endpoint),
            "MediaConvertTemplates" => Some(ResourceKind::JobTemplates),
            "MediaPackageVod" => Some(ResourceKind::PackagingGroup),
            _ => None,
        }
    }
}

/// One side effect against one resource kind for one request type.
#[async_trait]
pub trait LifecycleCommand: Send + Sync {
    async fn execute(
        &self,
        properties: &Map<String, Value>,
    ) -> Result<Map<String, Value>, LifecycleError>;
}

/// Commands keyed by `(kind, request type)`; adding a resource kind is one
/// more `register` call. Pairs nothing is registered for succeed as no-ops
/// so the provisioning tool never blocks on resources we do not manage.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<(ResourceKind, RequestType), Arc<dyn LifecycleCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        kind: ResourceKind,
        request_type: RequestType,
        command: Arc<dyn LifecycleCommand>,
    ) -> Self {
        self.commands.insert((kind, request_type), command);
        self
    }

    pub async fn dispatch(
        &self,
        request: &CustomResourceRequest,
    ) -> Result<Map<String, Value>, LifecycleError> {
        let resource = request
            .resource_properties
            .get("Resource")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let Some(kind) = ResourceKind::parse(resource) else {
            info!(resource, "Not a managed resource, sending success response");

            return Ok(Map::new());
        };

        let Some(command) = self.commands.get(&(kind, request.request_type)) else {
            info!(
                resource,
                request_type = ?request.request_type,
                "No lifecycle action registered, sending success response"
            );

            return Ok(Map::new());
        };

        command.execute(&request.resource_properties).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Marker(&'static str);

    #[async_trait]
    impl LifecycleCommand for Marker {
        async fn execute(
            &self,
            _: &Map<String, Value>,
        ) -> Result<Map<String, Value>, LifecycleError> {
            let mut data = Map::new();
            data.insert("Ran".to_string(), json!(self.0));
            Ok(data)
        }
    }

    fn request(resource: &str, request_type: &str) -> CustomResourceRequest {
        serde_json::from_value(json!({
            "RequestType": request_type,
            "ResponseURL": "https://callback.example/response",
            "StackId": "stack",
            "RequestId": "req",
            "LogicalResourceId": resource,
            "ResourceProperties": { "Resource": resource }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn routes_by_kind_and_request_type() {
        let registry = CommandRegistry::new()
            .register(
                ResourceKind::Endpoint,
                RequestType::Create,
                Arc::new(Marker("endpoint-create")),
            )
            .register(
                ResourceKind::Endpoint,
                RequestType::Update,
                Arc::new(Marker("endpoint-update")),
            );

        let data = registry
            .dispatch(&request("EndPoint", "Update"))
            .await
            .unwrap();

        assert_eq!(data["Ran"], "endpoint-update");
    }

    #[tokio::test]
    async fn unmanaged_resources_succeed_as_no_ops() {
        let registry = CommandRegistry::new();

        let data = registry
            .dispatch(&request("S3Notification", "Create"))
            .await
            .unwrap();
        assert!(data.is_empty());

        let data = registry
            .dispatch(&request("EndPoint", "Delete"))
            .await
            .unwrap();
        assert!(data.is_empty());
    }
}
