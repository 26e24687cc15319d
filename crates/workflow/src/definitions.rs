//! The three workflow definitions. The wiring is data: states, transitions
//! and choice branches; every operation lives in its task implementation.

use graph::{Branch, GraphError, StateGraph, StepTask};
use std::sync::Arc;

pub struct IngestTasks {
    pub input_validate: Arc<dyn StepTask>,
    pub mediainfo: Arc<dyn StepTask>,
    pub update_record: Arc<dyn StepTask>,
    pub sns_notification: Arc<dyn StepTask>,
    pub process_execute: Arc<dyn StepTask>,
}

pub fn ingest_graph(tasks: IngestTasks) -> Result<StateGraph, GraphError> {
    StateGraph::builder("ingest")
        .task("Input Validate", tasks.input_validate, Some("Mediainfo"))
        .task("Mediainfo", tasks.mediainfo, Some("Update Record (Ingest)"))
        .task(
            "Update Record (Ingest)",
            tasks.update_record,
            Some("Sns Choice (Ingest)"),
        )
        .choice(
            "Sns Choice (Ingest)",
            vec![Branch::bool_equals(
                "$.enableSns",
                true,
                "Sns Notification (Ingest)",
            )],
            Some("Process Execute"),
        )
        .task(
            "Sns Notification (Ingest)",
            tasks.sns_notification,
            Some("Process Execute"),
        )
        .task("Process Execute", tasks.process_execute, None)
        .build()
}

pub struct ProcessTasks {
    pub profiler: Arc<dyn StepTask>,
    pub encode: Arc<dyn StepTask>,
    pub update_record: Arc<dyn StepTask>,
}

/// The tier, acceleration and frame-capture choices intentionally carry no
/// default branch: an unexpected value halts the execution for an operator
/// to inspect instead of guessing an encode configuration.
pub fn process_graph(tasks: ProcessTasks) -> Result<StateGraph, GraphError> {
    StateGraph::builder("process")
        .task("Profiler", tasks.profiler, Some("Encoding Profile Check"))
        .choice(
            "Encoding Profile Check",
            vec![
                Branch::bool_equals("$.isCustomTemplate", true, "Custom Job Template"),
                Branch::number_equals("$.encodingProfile", 2160.0, "Job Template 2160p"),
                Branch::number_equals("$.encodingProfile", 1080.0, "Job Template 1080p"),
                Branch::number_equals("$.encodingProfile", 720.0, "Job Template 720p"),
            ],
            None,
        )
        .pass("Custom Job Template", Some("Accelerated Transcoding Check"))
        .pass("Job Template 2160p", Some("Accelerated Transcoding Check"))
        .pass("Job Template 1080p", Some("Accelerated Transcoding Check"))
        .pass("Job Template 720p", Some("Accelerated Transcoding Check"))
        .choice(
            "Accelerated Transcoding Check",
            vec![
                Branch::string_equals("$.acceleratedTranscoding", "ENABLED", "Acceleration Enabled"),
                Branch::string_equals(
                    "$.acceleratedTranscoding",
                    "PREFERRED",
                    "Acceleration Preferred",
                ),
                Branch::string_equals(
                    "$.acceleratedTranscoding",
                    "DISABLED",
                    "Acceleration Disabled",
                ),
            ],
            None,
        )
        .pass("Acceleration Enabled", Some("Frame Capture Check"))
        .pass("Acceleration Preferred", Some("Frame Capture Check"))
        .pass("Acceleration Disabled", Some("Frame Capture Check"))
        .choice(
            "Frame Capture Check",
            vec![
                Branch::bool_equals("$.frameCapture", true, "Frame Capture"),
                Branch::bool_equals("$.frameCapture", false, "No Frame Capture"),
            ],
            None,
        )
        .pass("Frame Capture", Some("Encode"))
        .pass("No Frame Capture", Some("Encode"))
        .task("Encode", tasks.encode, Some("Update Record (Process)"))
        .task("Update Record (Process)", tasks.update_record, None)
        .build()
}

pub struct PublishTasks {
    pub validate_output: Arc<dyn StepTask>,
    pub archive: Arc<dyn StepTask>,
    pub deep_archive: Arc<dyn StepTask>,
    pub media_package_assets: Arc<dyn StepTask>,
    pub update_record: Arc<dyn StepTask>,
    pub sqs_send_message: Arc<dyn StepTask>,
    pub sns_notification: Arc<dyn StepTask>,
}

pub fn publish_graph(tasks: PublishTasks) -> Result<StateGraph, GraphError> {
    StateGraph::builder("publish")
        .task(
            "Validate Encoding Output",
            tasks.validate_output,
            Some("Archive Source Choice"),
        )
        .choice(
            "Archive Source Choice",
            vec![
                Branch::string_equals("$.archiveSource", "GLACIER", "Archive"),
                Branch::string_equals("$.archiveSource", "DEEP_ARCHIVE", "Deep Archive"),
            ],
            Some("Media Package Choice"),
        )
        .task("Archive", tasks.archive, Some("Media Package Choice"))
        .task("Deep Archive", tasks.deep_archive, Some("Media Package Choice"))
        .choice(
            "Media Package Choice",
            vec![Branch::bool_equals(
                "$.enableMediaPackage",
                true,
                "Media Package Assets",
            )],
            Some("Update Record (Publish)"),
        )
        .task(
            "Media Package Assets",
            tasks.media_package_assets,
            Some("Update Record (Publish)"),
        )
        .task("Update Record (Publish)", tasks.update_record, Some("Sqs Choice"))
        .choice(
            "Sqs Choice",
            vec![Branch::bool_equals("$.enableSqs", true, "Sqs Send Message")],
            Some("Sns Choice (Publish)"),
        )
        .task(
            "Sqs Send Message",
            tasks.sqs_send_message,
            Some("Sns Choice (Publish)"),
        )
        .choice(
            "Sns Choice (Publish)",
            vec![Branch::bool_equals(
                "$.enableSns",
                true,
                "Sns Notification (Publish)",
            )],
            Some("Complete"),
        )
        .task(
            "Sns Notification (Publish)",
            tasks.sns_notification,
            Some("Complete"),
        )
        .pass("Complete", None)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graph::{Executor, Outcome, TaskError};
    use serde_json::{json, Value};

    struct Visit(&'static str);

    #[async_trait]
    impl StepTask for Visit {
        async fn run(&self, mut payload: Value) -> Result<Value, TaskError> {
            let mut visited = payload["visited"].as_array().cloned().unwrap_or_default();
            visited.push(json!(self.0));
            payload["visited"] = Value::Array(visited);
            Ok(payload)
        }
    }

    fn visit(name: &'static str) -> Arc<dyn StepTask> {
        Arc::new(Visit(name))
    }

    #[tokio::test]
    async fn ingest_skips_notification_when_disabled() {
        let graph = ingest_graph(IngestTasks {
            input_validate: visit("validate"),
            mediainfo: visit("mediainfo"),
            update_record: visit("update"),
            sns_notification: visit("sns"),
            process_execute: visit("process-execute"),
        })
        .unwrap();

        let outcome = Executor::new(None)
            .run(&graph, json!({ "enableSns": false }))
            .await
            .unwrap();

        assert_eq!(
            outcome.into_payload()["visited"],
            json!(["validate", "mediainfo", "update", "process-execute"])
        );
    }

    #[tokio::test]
    async fn process_stalls_on_an_unknown_tier() {
        let graph = process_graph(ProcessTasks {
            profiler: visit("profiler"),
            encode: visit("encode"),
            update_record: visit("update"),
        })
        .unwrap();

        let outcome = Executor::new(None)
            .run(
                &graph,
                json!({ "isCustomTemplate": false, "encodingProfile": 480 }),
            )
            .await
            .unwrap();

        match outcome {
            Outcome::Stalled { state, .. } => assert_eq!(state, "Encoding Profile Check"),
            Outcome::Completed(_) => panic!("expected the execution to stall"),
        }
    }

    #[tokio::test]
    async fn process_runs_every_tagging_choice() {
        let graph = process_graph(ProcessTasks {
            profiler: visit("profiler"),
            encode: visit("encode"),
            update_record: visit("update"),
        })
        .unwrap();

        let outcome = Executor::new(None)
            .run(
                &graph,
                json!({
                    "isCustomTemplate": false,
                    "encodingProfile": 1080,
                    "acceleratedTranscoding": "PREFERRED",
                    "frameCapture": true
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.into_payload()["visited"],
            json!(["profiler", "encode", "update"])
        );
    }

    #[tokio::test]
    async fn publish_orders_archive_packaging_and_egress() {
        let graph = publish_graph(PublishTasks {
            validate_output: visit("reconcile"),
            archive: visit("archive"),
            deep_archive: visit("deep-archive"),
            media_package_assets: visit("media-package"),
            update_record: visit("update"),
            sqs_send_message: visit("sqs"),
            sns_notification: visit("sns"),
        })
        .unwrap();

        let outcome = Executor::new(None)
            .run(
                &graph,
                json!({
                    "archiveSource": "DEEP_ARCHIVE",
                    "enableMediaPackage": true,
                    "enableSqs": true,
                    "enableSns": true
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.into_payload()["visited"],
            json!([
                "reconcile",
                "deep-archive",
                "media-package",
                "update",
                "sqs",
                "sns"
            ])
        );
    }
}
