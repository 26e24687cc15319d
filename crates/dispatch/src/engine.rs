use async_trait::async_trait;
use model::Error;

/// The workflow engine's execution surface. Execution names are the
/// idempotency boundary: the engine rejects a second execution with the same
/// name, and "does not exist" on a describe doubles as the probe signal for
/// a free name.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execution_exists(&self, state_machine_arn: &str, name: &str) -> Result<bool, Error>;

    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: &str,
        input: String,
    ) -> Result<(), Error>;
}

/// Step Functions implementation.
pub struct SfnExecutionEngine {
    sfn_client: aws_sdk_sfn::Client,
}

impl SfnExecutionEngine {
    pub fn new(sfn_client: aws_sdk_sfn::Client) -> Self {
        SfnExecutionEngine { sfn_client }
    }
}

#[async_trait]
impl ExecutionEngine for SfnExecutionEngine {
    async fn execution_exists(&self, state_machine_arn: &str, name: &str) -> Result<bool, Error> {
        let result = self
            .sfn_client
            .describe_execution()
            .execution_arn(execution_arn(state_machine_arn, name))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let does_not_exist = err
                    .as_service_error()
                    .map(|service_err| service_err.is_execution_does_not_exist())
                    .unwrap_or(false);

                if does_not_exist {
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: &str,
        input: String,
    ) -> Result<(), Error> {
        self.sfn_client
            .start_execution()
            .state_machine_arn(state_machine_arn)
            .name(name)
            .input(input)
            .send()
            .await?;

        Ok(())
    }
}

/// `arn:…:stateMachine:Name` + execution name -> `arn:…:execution:Name:name`
fn execution_arn(state_machine_arn: &str, name: &str) -> String {
    format!(
        "{}:{}",
        state_machine_arn.replacen(":stateMachine:", ":execution:", 1),
        name
    )
}
