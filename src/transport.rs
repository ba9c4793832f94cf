use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::Error;
use crate::request::{Request, Response};
use crate::retry::{RetryCoordinator, RetryPlan};

/// Performs the network call for an admitted request.
///
/// `submit` must not block. It returns whether the request was accepted; an
/// accepted request must eventually be completed exactly once through
/// [`Request::complete`]. A refused request is dropped, which resolves its
/// completion to [`Error::Cancelled`].
pub trait Transport: Send + Sync {
    fn submit(&self, request: Request) -> bool;
}

/// Reports whether the network is reachable. Queried synchronously before admission.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

impl<F> Connectivity for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_online(&self) -> bool {
        self()
    }
}

/// [`Transport`] backed by a `reqwest::Client`, running each request as a task on
/// the Tokio runtime it was built on. Retries are governed by its [`RetryPlan`].
pub struct ReqwestTransport {
    client: Client,
    retry: Arc<RetryCoordinator>,
    timeout: Duration,
    runtime: Handle,
}

impl ReqwestTransport {
    /// Must be called from within a Tokio runtime.
    pub fn new(client: Client, plan: RetryPlan, timeout: Duration) -> Result<Self, Error> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("ReqwestTransport needs a Tokio runtime: {e}")))?;
        Ok(Self {
            client,
            retry: Arc::new(RetryCoordinator::new(plan)),
            timeout,
            runtime,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Self::new(client, config.retry_plan()?, config.request_timeout())
    }
}

impl Transport for ReqwestTransport {
    fn submit(&self, request: Request) -> bool {
        let client = self.client.clone();
        let retry = Arc::clone(&self.retry);
        let timeout = self.timeout;
        self.runtime.spawn(execute(client, retry, timeout, request));
        true
    }
}

async fn execute(
    client: Client,
    retry: Arc<RetryCoordinator>,
    timeout: Duration,
    mut request: Request,
) {
    let request_id = request.id();
    let result = retry
        .execute(request_id, |attempt| {
            let mut builder = client
                .request(request.method().clone(), request.url().clone())
                .headers(request.headers().clone())
                .timeout(timeout);
            if let Some(body) = request.body() {
                builder = builder.body(body.to_vec());
            }
            send_once(builder, timeout, attempt)
        })
        .await
        .map(|(response, _)| response);

    match &result {
        Ok(response) => debug!(
            request_id = %request_id,
            status = %response.status,
            bytes = response.body.len(),
            "transport.success"
        ),
        Err(err) => warn!(request_id = %request_id, error = %err, "transport.failure"),
    }
    request.complete(result);
}

async fn send_once(
    builder: reqwest::RequestBuilder,
    timeout: Duration,
    attempt: u8,
) -> Result<Response, Error> {
    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout(timeout)
        } else {
            Error::Reqwest(e)
        }
    })?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    if !status.is_success() {
        let body = String::from_utf8_lossy(&body).into_owned();
        warn!(status = %status, attempt, body = %body, "transport.status");
        return Err(Error::Http(status, body));
    }
    Ok(Response {
        status,
        headers,
        body,
    })
}
