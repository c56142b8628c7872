use std::time::Duration;

use async_trait::async_trait;

use crate::dispatch::{DispatchOutcome, DispatchPayload, WorkerInvoker};

/// Invokes workers by POSTing the dispatch payload to an HTTP endpoint.
///
/// 2xx is an acknowledgement. A timeout means the request may have reached
/// the worker, so it is reported as [`DispatchOutcome::Unknown`] rather than
/// a failure.
#[derive(Debug, Clone)]
pub struct HttpWorkerInvoker {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpWorkerInvoker {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

#[async_trait]
impl WorkerInvoker for HttpWorkerInvoker {
    async fn invoke(&self, payload: &DispatchPayload) -> DispatchOutcome {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => DispatchOutcome::Dispatched,
            Ok(resp) => DispatchOutcome::Failed(format!("worker returned HTTP {}", resp.status())),
            Err(e) if e.is_timeout() => DispatchOutcome::Unknown,
            Err(e) => DispatchOutcome::Failed(e.to_string()),
        }
    }
}
