use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::config::BridgeConfig;
use crate::error::SyncError;

/// Status and body of one request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::Unreachable(err.to_string())
    }
}

/// Request/response seam to the remote simulator. Paths are relative to the API prefix.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError>;

    async fn post_form(
        &self,
        path: &str,
        form: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// Converts a completed exchange into the sync taxonomy.
pub fn expect_success(
    result: Result<TransportResponse, TransportError>,
) -> Result<String, SyncError> {
    let response = result?;
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(SyncError::HttpError {
            status: response.status,
            body: response.body,
        })
    }
}

/// HTTP transport; timeouts are delegated to the client.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    config: Arc<BridgeConfig>,
}

impl HttpTransport {
    pub fn new(config: Arc<BridgeConfig>) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(config.remote.request_timeout())
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { http, config })
    }

    async fn finish(
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<TransportResponse, TransportError> {
        let response = response.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        let url = self.config.endpoint_url(path);
        Self::finish(self.http.get(url).query(query).send().await).await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        let url = self.config.endpoint_url(path);
        Self::finish(self.http.post(url).form(form).send().await).await
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub path: String,
        pub params: Vec<(&'static str, String)>,
    }

    /// In-memory transport answering from per-path reply queues.
    ///
    /// Unscripted paths answer `200 ok`. While held, requests are recorded and then
    /// parked until [`ScriptedTransport::release`].
    pub struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Result<TransportResponse, TransportError>>>>,
        requests: Mutex<Vec<RecordedRequest>>,
        held: AtomicBool,
        gate: Semaphore,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                held: AtomicBool::new(false),
                gate: Semaphore::new(0),
            }
        }

        pub fn reply(&self, path: &str, status: u16, body: impl Into<String>) {
            self.push(
                path,
                Ok(TransportResponse {
                    status,
                    body: body.into(),
                }),
            );
        }

        pub fn fail(&self, path: &str, err: TransportError) {
            self.push(path, Err(err));
        }

        fn push(&self, path: &str, reply: Result<TransportResponse, TransportError>) {
            self.replies
                .lock()
                .entry(path.to_string())
                .or_default()
                .push_back(reply);
        }

        pub fn hold(&self) {
            self.held.store(true, Ordering::SeqCst);
        }

        pub fn release(&self) {
            self.held.store(false, Ordering::SeqCst);
            self.gate.add_permits(1024);
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().clone()
        }

        pub fn count(&self, path: &str) -> usize {
            self.requests.lock().iter().filter(|r| r.path == path).count()
        }

        pub async fn wait_for(&self, path: &str, expected: usize) {
            while self.count(path) < expected {
                tokio::task::yield_now().await;
            }
        }

        async fn serve(
            &self,
            method: &'static str,
            path: &str,
            params: &[(&'static str, String)],
        ) -> Result<TransportResponse, TransportError> {
            self.requests.lock().push(RecordedRequest {
                method,
                path: path.to_string(),
                params: params.to_vec(),
            });
            if self.held.load(Ordering::SeqCst) {
                let _permit = self.gate.acquire().await;
            }
            self.replies
                .lock()
                .get_mut(path)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Ok(TransportResponse::ok("ok")))
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(
            &self,
            path: &str,
            query: &[(&'static str, String)],
        ) -> Result<TransportResponse, TransportError> {
            self.serve("GET", path, query).await
        }

        async fn post_form(
            &self,
            path: &str,
            form: &[(&'static str, String)],
        ) -> Result<TransportResponse, TransportError> {
            self.serve("POST", path, form).await
        }
    }
}
