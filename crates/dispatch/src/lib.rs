//! Entry point correlating inbound events to workflow executions.
//!
//! One event in, exactly one execution started. The execution name doubles
//! as the idempotency key: the engine rejects duplicate names, and re-runs
//! of the same logical asset get a `__rerun_N` suffix found by probing.

use graph::FailureSink;
use lambda_runtime::LambdaEvent;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

mod engine;
mod trigger;

pub use engine::{ExecutionEngine, SfnExecutionEngine};

use model::key::decode as decode_key;
use trigger::{id_from_key_path, trigger_kind};

/// How many execution names are probed for one caller-supplied id before
/// giving up and generating a random one.
const MAX_NAME_PROBES: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid event object")]
    InvalidEvent,

    #[error("execution name probe failed: {0}")]
    Probe(#[source] model::Error),

    #[error("failed to start execution: {0}")]
    StartFailed(#[source] model::Error),
}

/// Target state machines, one per workflow stage.
#[derive(Debug, Clone)]
pub struct StateMachineArns {
    pub ingest: String,
    pub process: String,
    pub publish: String,
}

struct ExecutionPlan {
    state_machine_arn: String,
    name: String,
    input: Value,
}

pub struct Dispatcher {
    engine: Arc<dyn ExecutionEngine>,
    s3_client: aws_sdk_s3::Client,
    arns: StateMachineArns,
    failure_sink: Option<Arc<dyn FailureSink>>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        s3_client: aws_sdk_s3::Client,
        arns: StateMachineArns,
        failure_sink: Option<Arc<dyn FailureSink>>,
    ) -> Self {
        Dispatcher {
            engine,
            s3_client,
            arns,
            failure_sink,
        }
    }

    /// Classify the event, resolve a collision-free execution name and start
    /// the matching workflow.
    pub async fn dispatch(&self, event: Value) -> Result<String, DispatchError> {
        let plan: ExecutionPlan = if event.get("Records").is_some() {
            self.plan_ingest(&event).await?
        } else if event.get("guid").is_some() {
            plan_process(&event, &self.arns.process)?
        } else if event.get("detail").is_some() {
            plan_publish(event.clone(), &self.arns.publish)?
        } else {
            return Err(DispatchError::InvalidEvent);
        };

        info!(
            execution = plan.name.as_str(),
            state_machine = plan.state_machine_arn.as_str(),
            "Starting execution"
        );

        let input = plan.input.to_string();
        if let Err(err) = self
            .engine
            .start_execution(&plan.state_machine_arn, &plan.name, input)
            .await
        {
            self.report_failure(&plan.name, &err).await;

            return Err(DispatchError::StartFailed(err));
        }

        Ok("success".to_string())
    }

    async fn plan_ingest(&self, event: &Value) -> Result<ExecutionPlan, DispatchError> {
        let record = event["Records"]
            .get(0)
            .ok_or(DispatchError::InvalidEvent)?;
        let event_name = record["eventName"].as_str().unwrap_or_default();
        let bucket = record["s3"]["bucket"]["name"]
            .as_str()
            .ok_or(DispatchError::InvalidEvent)?;
        let key = decode_key(
            record["s3"]["object"]["key"]
                .as_str()
                .ok_or(DispatchError::InvalidEvent)?,
        );

        let removal: bool = event_name.starts_with("ObjectRemoved");

        // The metadata read is best-effort: a removed or unreadable object
        // degrades to "no metadata", the id then comes from the key path.
        let metadata: HashMap<String, String> = if removal {
            HashMap::new()
        } else {
            self.object_metadata(bucket, &key).await
        };

        let command_id: Option<String> = metadata.get("command-id").cloned();
        let cms_id: Option<String> = metadata
            .get("cms-id")
            .cloned()
            .or_else(|| id_from_key_path(&key));

        let caller_id: Option<String> = command_id.clone().or_else(|| cms_id.clone());
        let name: String = self.resolve_execution_name(caller_id).await?;

        let mut input = event.clone();
        input["guid"] = json!(&name);
        input["workflowTrigger"] = json!(trigger_kind(&key));
        if removal {
            input["doPurge"] = json!(true);
        }
        if let Some(cms_id) = cms_id {
            input["cmsId"] = json!(cms_id);
        }
        if let Some(command_id) = command_id {
            input["cmsCommandId"] = json!(command_id);
        }

        Ok(ExecutionPlan {
            state_machine_arn: self.arns.ingest.clone(),
            name,
            input,
        })
    }

    /// Probe `<id>`, `<id>__rerun_1`, ... until the engine reports a free
    /// name. All taken, or no caller id at all, falls back to a random one.
    async fn resolve_execution_name(
        &self,
        caller_id: Option<String>,
    ) -> Result<String, DispatchError> {
        if let Some(base) = caller_id {
            for attempt in 0..MAX_NAME_PROBES {
                let name = match attempt {
                    0 => base.clone(),
                    n => format!("{base}__rerun_{n}"),
                };

                let exists = self
                    .engine
                    .execution_exists(&self.arns.ingest, &name)
                    .await
                    .map_err(DispatchError::Probe)?;

                if !exists {
                    return Ok(name);
                }
            }

            warn!(
                caller_id = base.as_str(),
                "All {MAX_NAME_PROBES} execution names taken, generating a random id"
            );
        }

        Ok(Uuid::new_v4().to_string())
    }

    async fn object_metadata(&self, bucket: &str, key: &str) -> HashMap<String, String> {
        let head = self
            .s3_client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;

        match head {
            Ok(output) => output.metadata.unwrap_or_default(),
            Err(err) => {
                warn!(bucket, key, "Metadata read failed: {err}");

                HashMap::new()
            }
        }
    }

    async fn report_failure(&self, guid: &str, err: &model::Error) {
        if let Some(sink) = &self.failure_sink {
            sink.task_failed(json!({
                "guid": guid,
                "function": "WorkflowTrigger",
                "error": err.to_string(),
            }))
            .await;
        }
    }
}

fn plan_process(event: &Value, arn: &str) -> Result<ExecutionPlan, DispatchError> {
    let guid = event["guid"]
        .as_str()
        .ok_or(DispatchError::InvalidEvent)?
        .to_string();

    Ok(ExecutionPlan {
        state_machine_arn: arn.to_string(),
        input: json!({ "guid": &guid }),
        name: guid,
    })
}

fn plan_publish(event: Value, arn: &str) -> Result<ExecutionPlan, DispatchError> {
    let guid = event["detail"]["userMetadata"]["guid"]
        .as_str()
        .ok_or(DispatchError::InvalidEvent)?
        .to_string();

    Ok(ExecutionPlan {
        state_machine_arn: arn.to_string(),
        name: guid,
        input: event,
    })
}

/// Lambda-shaped adapter around [`Dispatcher::dispatch`].
pub async fn handler(
    dispatcher: &Dispatcher,
    event: LambdaEvent<Value>,
) -> Result<String, model::Error> {
    info!("REQUEST:: {}", event.payload);

    Ok(dispatcher.dispatch(event.payload).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aws_sdk_s3::operation::head_object::HeadObjectError;
    use aws_sdk_s3::types::error::NotFound;
    use aws_smithy_mocks::{mock, mock_client};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEngine {
        existing: Mutex<HashSet<String>>,
        started: Mutex<Vec<(String, String, String)>>,
        fail_start: bool,
    }

    impl FakeEngine {
        fn with_existing(names: &[&str]) -> Self {
            FakeEngine {
                existing: Mutex::new(names.iter().map(|name| name.to_string()).collect()),
                ..Default::default()
            }
        }

        fn started_names(&self) -> Vec<String> {
            self.started
                .lock()
                .unwrap()
                .iter()
                .map(|(_, name, _)| name.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ExecutionEngine for FakeEngine {
        async fn execution_exists(&self, _: &str, name: &str) -> Result<bool, model::Error> {
            Ok(self.existing.lock().unwrap().contains(name))
        }

        async fn start_execution(
            &self,
            state_machine_arn: &str,
            name: &str,
            input: String,
        ) -> Result<(), model::Error> {
            if self.fail_start {
                return Err("ExecutionAlreadyExists".into());
            }

            self.started.lock().unwrap().push((
                state_machine_arn.to_string(),
                name.to_string(),
                input,
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        events: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl FailureSink for CapturingSink {
        async fn task_failed(&self, event: Value) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn metadata_less_s3_client() -> aws_sdk_s3::Client {
        let head_rule = mock!(aws_sdk_s3::Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));

        mock_client!(aws_sdk_s3, [&head_rule])
    }

    fn arns() -> StateMachineArns {
        StateMachineArns {
            ingest: "arn:aws:states:eu-west-1:123:stateMachine:vod-ingest".to_string(),
            process: "arn:aws:states:eu-west-1:123:stateMachine:vod-process".to_string(),
            publish: "arn:aws:states:eu-west-1:123:stateMachine:vod-publish".to_string(),
        }
    }

    fn dispatcher(engine: Arc<FakeEngine>) -> Dispatcher {
        Dispatcher::new(engine, metadata_less_s3_client(), arns(), None)
    }

    fn ingest_event(event_name: &str, key: &str) -> Value {
        json!({
            "Records": [{
                "eventName": event_name,
                "s3": {
                    "bucket": { "name": "master-videos" },
                    "object": { "key": key }
                }
            }]
        })
    }

    #[tokio::test]
    async fn probes_past_taken_rerun_names() {
        let engine = Arc::new(FakeEngine::with_existing(&["abc123", "abc123__rerun_1"]));

        dispatcher(engine.clone())
            .dispatch(ingest_event("ObjectCreated:Put", "2024/05/abc123/video.mp4"))
            .await
            .unwrap();

        assert_eq!(engine.started_names(), vec!["abc123__rerun_2"]);
    }

    #[tokio::test]
    async fn recovers_cms_id_from_the_key_path() {
        let engine = Arc::new(FakeEngine::default());

        dispatcher(engine.clone())
            .dispatch(ingest_event("ObjectCreated:Put", "2024/05/abc123/video.mp4"))
            .await
            .unwrap();

        let started = engine.started.lock().unwrap();
        let input: Value = serde_json::from_str(&started[0].2).unwrap();

        assert_eq!(input["cmsId"], "abc123");
        assert_eq!(input["guid"], "abc123");
        assert_eq!(input["workflowTrigger"], "Video");
    }

    #[tokio::test]
    async fn removal_sets_the_purge_flag_and_keeps_the_path_id() {
        let engine = Arc::new(FakeEngine::default());

        dispatcher(engine.clone())
            .dispatch(ingest_event(
                "ObjectRemoved:Delete",
                "2024/05/abc123/video.mp4",
            ))
            .await
            .unwrap();

        let started = engine.started.lock().unwrap();
        let input: Value = serde_json::from_str(&started[0].2).unwrap();

        assert_eq!(input["doPurge"], true);
        assert_eq!(input["guid"], "abc123");
    }

    #[tokio::test]
    async fn unpatterned_key_gets_a_random_id() {
        let engine = Arc::new(FakeEngine::default());

        dispatcher(engine.clone())
            .dispatch(ingest_event("ObjectCreated:Put", "uploads/video.mp4"))
            .await
            .unwrap();

        let names = engine.started_names();
        assert!(Uuid::parse_str(&names[0]).is_ok());
    }

    #[tokio::test]
    async fn exhausted_probes_fall_back_to_a_random_id() {
        let mut taken: Vec<String> = vec!["abc123".to_string()];
        taken.extend((1..50).map(|n| format!("abc123__rerun_{n}")));
        let taken_refs: Vec<&str> = taken.iter().map(String::as_str).collect();

        let engine = Arc::new(FakeEngine::with_existing(&taken_refs));

        dispatcher(engine.clone())
            .dispatch(ingest_event("ObjectCreated:Put", "2024/05/abc123/video.mp4"))
            .await
            .unwrap();

        let names = engine.started_names();
        assert!(Uuid::parse_str(&names[0]).is_ok());
    }

    #[tokio::test]
    async fn metadata_sidecar_keys_use_the_metadata_trigger() {
        let engine = Arc::new(FakeEngine::default());

        dispatcher(engine.clone())
            .dispatch(ingest_event("ObjectCreated:Put", "2024/05/abc123/meta.json"))
            .await
            .unwrap();

        let started = engine.started.lock().unwrap();
        let input: Value = serde_json::from_str(&started[0].2).unwrap();

        assert_eq!(input["workflowTrigger"], "Metadata");
    }

    #[tokio::test]
    async fn guid_only_event_starts_the_process_workflow() {
        let engine = Arc::new(FakeEngine::default());

        dispatcher(engine.clone())
            .dispatch(json!({ "guid": "abc123" }))
            .await
            .unwrap();

        let started = engine.started.lock().unwrap();
        assert!(started[0].0.ends_with("vod-process"));
        assert_eq!(started[0].1, "abc123");
        assert_eq!(started[0].2, json!({ "guid": "abc123" }).to_string());
    }

    #[tokio::test]
    async fn completion_event_starts_the_publish_workflow() {
        let engine = Arc::new(FakeEngine::default());

        dispatcher(engine.clone())
            .dispatch(json!({
                "detail": { "status": "COMPLETE", "userMetadata": { "guid": "abc123" } }
            }))
            .await
            .unwrap();

        let started = engine.started.lock().unwrap();
        assert!(started[0].0.ends_with("vod-publish"));
        assert_eq!(started[0].1, "abc123");
    }

    #[tokio::test]
    async fn unclassifiable_event_is_invalid() {
        let engine = Arc::new(FakeEngine::default());

        let err = dispatcher(engine)
            .dispatch(json!({ "unexpected": true }))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidEvent));
    }

    #[tokio::test]
    async fn start_failure_is_classified_then_reraised() {
        let engine = Arc::new(FakeEngine {
            fail_start: true,
            ..Default::default()
        });
        let sink = Arc::new(CapturingSink::default());

        let dispatcher = Dispatcher::new(
            engine,
            metadata_less_s3_client(),
            arns(),
            Some(sink.clone()),
        );

        let err = dispatcher
            .dispatch(json!({ "guid": "abc123" }))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::StartFailed(_)));

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0]["guid"], "abc123");
        assert_eq!(events[0]["function"], "WorkflowTrigger");
    }
}
