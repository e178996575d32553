use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{ConnectionTest, ErrorBody, GenerateParams, Generation, ModelList};
use crate::error::ClientError;

/// Endpoint action, sent as the `action` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Generate,
    Models,
    Test,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Models => "models",
            Action::Test => "test",
        }
    }

    /// Shown when a failed response carries no `error` text
    fn fallback_error(&self) -> &'static str {
        match self {
            Action::Generate => "Generation failed",
            Action::Models => "Failed to fetch models",
            Action::Test => "Test failed",
        }
    }
}

#[derive(Debug, Default)]
struct Status {
    in_flight: usize,
    last_error: Option<String>,
}

fn lock(status: &Mutex<Status>) -> MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks one call as outstanding until dropped, including when the calling
/// future is aborted mid-request.
struct InFlight {
    status: Arc<Mutex<Status>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut status = lock(&self.status);
        status.in_flight = status.in_flight.saturating_sub(1);
    }
}

/// Client for the playground endpoint.
///
/// Clones share the loading flag and the last error. Every call still
/// returns its own result, which is what callers should act on.
#[derive(Clone)]
pub struct PlaygroundClient {
    client: Client,
    base_url: String,
    status: Arc<Mutex<Status>>,
}

impl PlaygroundClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            status: Arc::new(Mutex::new(Status::default())),
        }
    }

    /// True while any call made through this client (or a clone) is outstanding
    pub fn is_loading(&self) -> bool {
        lock(&self.status).in_flight > 0
    }

    /// Error text of the most recent failed call, cleared when a call starts
    pub fn last_error(&self) -> Option<String> {
        lock(&self.status).last_error.clone()
    }

    pub async fn generate(&self, params: &GenerateParams) -> Result<Generation, ClientError> {
        self.call(Action::Generate, Method::POST, Some(params)).await
    }

    pub async fn get_models(&self) -> Result<ModelList, ClientError> {
        self.call::<(), _>(Action::Models, Method::GET, None).await
    }

    pub async fn test_connection(&self, model: Option<&str>) -> Result<ConnectionTest, ClientError> {
        let body = match model {
            Some(model) => serde_json::json!({ "model": model }),
            None => serde_json::json!({}),
        };
        self.call(Action::Test, Method::POST, Some(&body)).await
    }

    async fn call<B, T>(&self, action: Action, method: Method, body: Option<&B>) -> Result<T, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let _in_flight = self.begin();
        debug!(action = action.as_str(), url = %self.base_url, "sending request");

        let result = self.send(action, method, body).await;
        match &result {
            Ok(_) => debug!(action = action.as_str(), "request succeeded"),
            Err(err) => {
                warn!(action = action.as_str(), error = %err, "request failed");
                lock(&self.status).last_error = Some(err.to_string());
            }
        }
        result
    }

    fn begin(&self) -> InFlight {
        let mut status = lock(&self.status);
        status.in_flight += 1;
        status.last_error = None;
        InFlight {
            status: Arc::clone(&self.status),
        }
    }

    async fn send<B, T>(&self, action: Action, method: Method, body: Option<&B>) -> Result<T, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .request(method, self.base_url.as_str())
            .query(&[("action", action.as_str())]);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| action.fallback_error().to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(ClientError::transport)
    }
}
