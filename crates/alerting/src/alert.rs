use async_trait::async_trait;
use model::{Error, WorkflowStatus};
use reqwest::StatusCode;
use serde_json::json;

/// The external alerting service, addressed by an alias so one failing asset
/// maps to at most one open alert.
#[async_trait]
pub trait AlertApi: Send + Sync {
    async fn find_open(&self, alias: &str) -> Result<Option<String>, Error>;

    async fn open(&self, alias: &str, message: &str, details: &str) -> Result<(), Error>;

    async fn close(&self, alias: &str) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    Open,
    Close,
}

/// The 2-state alert lifecycle: open on the first terminal failure, close on
/// recovery, no-op otherwise. Keeps repeat failures from paging twice and
/// auto-resolves once the asset succeeds.
pub fn alert_action(open_alert_exists: bool, status: WorkflowStatus) -> Option<AlertAction> {
    match (open_alert_exists, status) {
        (false, status) if status.is_terminal_failure() => Some(AlertAction::Open),
        (true, status) if status.is_success() => Some(AlertAction::Close),
        _ => None,
    }
}

/// Alias-keyed REST implementation of the alerting service.
pub struct HttpAlertApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAlertApi {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        HttpAlertApi {
            http,
            base_url,
            api_key,
        }
    }

    fn alias_url(&self, alias: &str, suffix: &str) -> String {
        format!(
            "{}/v2/alerts/{alias}{suffix}?identifierType=alias",
            self.base_url
        )
    }
}

#[async_trait]
impl AlertApi for HttpAlertApi {
    async fn find_open(&self, alias: &str) -> Result<Option<String>, Error> {
        let response = self
            .http
            .get(self.alias_url(alias, ""))
            .header("Authorization", &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: serde_json::Value = response.error_for_status()?.json().await?;
        let id = body["data"]["id"].as_str().map(str::to_string);

        Ok(id)
    }

    async fn open(&self, alias: &str, message: &str, details: &str) -> Result<(), Error> {
        self.http
            .post(format!("{}/v2/alerts", self.base_url))
            .header("Authorization", &self.api_key)
            .json(&json!({
                "alias": alias,
                "message": message,
                "description": details,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn close(&self, alias: &str) -> Result<(), Error> {
        self.http
            .post(self.alias_url(alias, "/close"))
            .header("Authorization", &self.api_key)
            .json(&json!({}))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
