use crate::config::matrix_config::NotifyConfig;
use crate::domain::model::RunSummary;
use crate::utils::error::Result;

/// POST the run summary to the configured webhook. Callers treat a
/// notification failure as log-only; it never changes the run result.
pub async fn send_webhook(config: &NotifyConfig, summary: &RunSummary) -> Result<bool> {
    let wants_notification = if summary.is_success() {
        config.on_success.unwrap_or(true)
    } else {
        config.on_failure.unwrap_or(true)
    };
    if !wants_notification {
        tracing::debug!("Webhook suppressed for this result");
        return Ok(false);
    }

    let payload = serde_json::json!({
        "matrix": summary.matrix_name,
        "execution_id": summary.execution_id,
        "success": summary.is_success(),
        "total_jobs": summary.total_jobs,
        "passed": summary.passed,
        "failed": summary.failed,
        "failed_allowed": summary.failed_allowed,
        "skipped": summary.skipped,
        "duration_ms": summary.total_duration.as_millis() as u64,
    });

    let client = reqwest::Client::new();
    let response = client
        .post(&config.webhook_url)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;

    tracing::info!("📣 Webhook delivered ({})", response.status());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::RunSummary;
    use httpmock::prelude::*;

    fn summary(failed: usize) -> RunSummary {
        RunSummary {
            matrix_name: "mitogen".to_string(),
            execution_id: "run-test".to_string(),
            started_at: chrono::Utc::now(),
            total_jobs: 2,
            passed: 2 - failed,
            failed,
            failed_allowed: 0,
            skipped: 0,
            total_duration: std::time::Duration::from_millis(10),
            outcomes: Vec::new(),
        }
    }

    fn notify_config(url: String) -> NotifyConfig {
        NotifyConfig {
            webhook_url: url,
            on_success: None,
            on_failure: None,
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_summary_json() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .json_body_partial(r#"{"matrix": "mitogen", "success": true, "passed": 2}"#);
            then.status(200);
        });

        let sent = send_webhook(&notify_config(server.url("/hook")), &summary(0))
            .await
            .unwrap();

        hook.assert();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_webhook_server_error_is_reported() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(500);
        });

        let result = send_webhook(&notify_config(server.url("/hook")), &summary(1)).await;

        hook.assert();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_webhook_suppressed_on_success() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(200);
        });

        let config = NotifyConfig {
            webhook_url: server.url("/hook"),
            on_success: Some(false),
            on_failure: None,
        };

        let sent = send_webhook(&config, &summary(0)).await.unwrap();
        assert!(!sent);
        hook.assert_hits(0);
    }
}
