use model::Error;
use serde_json::json;

/// Incident-channel webhook. Strictly best-effort: the caller logs failures
/// and moves on.
pub struct ChatNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl ChatNotifier {
    pub fn new(http: reqwest::Client, webhook_url: String) -> Self {
        ChatNotifier { http, webhook_url }
    }

    pub async fn post(&self, text: &str) -> Result<(), Error> {
        self.http
            .post(&self.webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
