use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue, USER_AGENT};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinator::{Admission, RefreshCoordinator, RefreshStatus, RefreshTrigger};
use crate::credential::Credential;
use crate::endpoint::{self, EndpointCall, ResourcePoint};
use crate::errors::{Error, Result};
use crate::lifecycle::LifecycleGate;
use crate::request::{Completion, Request};
use crate::transport::{AlwaysOnline, Connectivity, Transport};

/// External capabilities the dispatcher is armed with.
pub struct Capabilities {
    pub transport: Arc<dyn Transport>,
    pub connectivity: Arc<dyn Connectivity>,
}

impl Capabilities {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            connectivity: Arc::new(AlwaysOnline),
        }
    }

    pub fn with_connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.connectivity = Arc::new(connectivity);
        self
    }
}

struct Armed {
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    coordinator: RefreshCoordinator,
    user_agent: HeaderValue,
    params_encoding: String,
}

/// Entry point for authenticated requests.
///
/// Construct one, [`initialize`](Self::initialize) it once, and share it (usually
/// behind an `Arc`) with every call site. Requests are admitted straight to the
/// transport unless the access token is inside its refresh lead window, in which
/// case they are held until the application reports the refresh outcome through
/// [`refresh_completed`](Self::refresh_completed).
pub struct Dispatcher {
    gate: LifecycleGate<Armed>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            gate: LifecycleGate::new(),
        }
    }

    /// Arms the dispatcher. Only the first successful call runs `capabilities`;
    /// later calls return `Ok(false)` and change nothing. While `capabilities`
    /// runs the dispatcher still reports not ready; it must not call
    /// `initialize` itself.
    pub fn initialize<F>(&self, config: &Config, capabilities: F) -> Result<bool>
    where
        F: FnOnce(&Config) -> Result<Capabilities>,
    {
        self.gate.initialize(|| {
            let Capabilities {
                transport,
                connectivity,
            } = capabilities(config)?;
            let user_agent = HeaderValue::from_str(&config.user_agent())
                .map_err(|e| Error::Config(format!("Invalid user agent: {e}")))?;
            info!(
                user_agent = %config.user_agent(),
                lead_time_secs = config.lead_time_secs,
                "dispatcher.initialize"
            );
            Ok(Armed {
                transport,
                connectivity,
                coordinator: RefreshCoordinator::new(config.lead_time()),
                user_agent,
                params_encoding: config.params_encoding.clone(),
            })
        })
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn require_ready(&self) -> Result<()> {
        self.gate.require_ready().map(|_| ())
    }

    /// Submits a prepared request.
    ///
    /// `Ok(true)` means the request entered the pipeline: either the transport
    /// accepted it or it is held until the current refresh cycle resolves.
    /// `Ok(false)` means it was refused (offline, or the transport declined); its
    /// completion then resolves to an error.
    pub fn send(&self, request: Request) -> Result<bool> {
        let armed = self.gate.require_ready()?;

        if !armed.connectivity.is_online() {
            debug!(request_id = %request.id(), "dispatch.offline");
            request.fail(Error::Unreachable);
            return Ok(false);
        }

        match armed.coordinator.submit(request) {
            Admission::Deferred => Ok(true),
            Admission::Admit(request) => Ok(armed.hand_off(request)),
        }
    }

    /// Resolves `call` against `point` and sends it.
    ///
    /// Returns `Ok(None)` when the request was refused, in the same cases as
    /// [`send`](Self::send).
    pub fn fire_at<P: ResourcePoint>(
        &self,
        point: &P,
        call: EndpointCall,
    ) -> Result<Option<Completion<P::Output>>> {
        let (request, completion) = self.build(point, call)?;
        let parser = point.response_parser();
        let completion = completion.map_response(move |response| parser(response));
        Ok(self.send(request)?.then_some(completion))
    }

    /// Like [`fire_at`](Self::fire_at) for the request that performs the token
    /// refresh. It is never held behind the refresh cycle it belongs to, and it
    /// does not carry the (expiring) access token unless the call sets one.
    pub fn fire_refresh_at<P: ResourcePoint>(
        &self,
        point: &P,
        call: EndpointCall,
    ) -> Result<Option<Completion<P::Output>>> {
        let (request, completion) = self.build(point, call)?;
        let parser = point.response_parser();
        let completion = completion.map_response(move |response| parser(response));
        Ok(self
            .send(request.as_refresh().without_auth())?
            .then_some(completion))
    }

    fn build<P: ResourcePoint>(
        &self,
        point: &P,
        call: EndpointCall,
    ) -> Result<(Request, Completion)> {
        let armed = self.gate.require_ready()?;
        let EndpointCall {
            method,
            path_params,
            mut headers,
            params,
            encoding,
        } = call;
        let encoding = encoding.unwrap_or_else(|| armed.params_encoding.clone());
        endpoint::ensure_supported_encoding(&encoding)?;

        let url = point.url(&path_params, &encoding)?;
        let placed = endpoint::place_params(&method, url, &params);
        endpoint::apply_content_type(&mut headers, placed.content_type);

        let (request, completion) = Request::new(method, placed.url);
        let request = request.with_headers(headers);
        let request = match placed.body {
            Some(body) => request.with_body(body),
            None => request,
        };
        Ok((request, completion))
    }

    /// Reports the outcome of the refresh started by the registered trigger.
    ///
    /// On success the held requests are handed to the transport in the order they
    /// were deferred, carrying whatever credential is current at that moment, and
    /// the number replayed is returned. On failure they are discarded and each
    /// resolves to [`Error::RefreshFailed`].
    pub fn refresh_completed(&self, success: bool) -> Result<usize> {
        let armed = self.gate.require_ready()?;
        let replay = armed.coordinator.refresh_completed(success);
        let count = replay.len();
        for request in replay {
            armed.hand_off(request);
        }
        Ok(count)
    }

    /// Fails the current refresh cycle if it has been open for at least `timeout`.
    pub fn fail_stale_refresh(&self, timeout: Duration) -> Result<Option<usize>> {
        Ok(self.gate.require_ready()?.coordinator.fail_stale(timeout))
    }

    pub fn refresh_status(&self) -> Result<RefreshStatus> {
        Ok(self.gate.require_ready()?.coordinator.status())
    }

    pub fn set_credentials(&self, credential: Credential) -> Result<()> {
        self.gate
            .require_ready()?
            .coordinator
            .set_credential(Some(credential));
        Ok(())
    }

    /// Stores `credential` and registers `trigger` as the refresh action in one step.
    ///
    /// The trigger runs on whichever thread submits the request that crosses the
    /// lead window. It should start the refresh and return; a trigger that holds
    /// an `Arc<Dispatcher>` keeps the dispatcher alive, so prefer a `Weak`.
    pub fn set_credentials_with_refresh<F>(&self, credential: Credential, trigger: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.gate
            .require_ready()?
            .coordinator
            .set_credential_and_trigger(credential, Arc::new(trigger));
        Ok(())
    }

    /// Registers the refresh action, replacing any previous one.
    pub fn register_refresh<F>(&self, trigger: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let trigger: RefreshTrigger = Arc::new(trigger);
        self.gate
            .require_ready()?
            .coordinator
            .register_refresh(Some(trigger));
        Ok(())
    }

    pub fn clear_refresh(&self) -> Result<()> {
        self.gate.require_ready()?.coordinator.register_refresh(None);
        Ok(())
    }

    /// Clears the credential, e.g. on logout. Later requests are admitted without auth.
    pub fn invalidate_credentials(&self) -> Result<()> {
        self.gate.require_ready()?.coordinator.set_credential(None);
        Ok(())
    }

    pub fn credential(&self) -> Result<Option<Credential>> {
        Ok(self.gate.require_ready()?.coordinator.credential())
    }

    pub fn user_agent(&self) -> Result<String> {
        let armed = self.gate.require_ready()?;
        Ok(armed.user_agent.to_str().unwrap_or_default().to_string())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Armed {
    /// Attaches ambient headers and passes the request to the transport.
    fn hand_off(&self, mut request: Request) -> bool {
        let authorization = if request.authenticate() {
            self.coordinator
                .credential()
                .and_then(|credential| credential.authorization_header())
        } else {
            None
        };
        let headers = request.headers_mut();
        headers
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        if let Some(value) = authorization {
            headers.entry(AUTHORIZATION).or_insert(value);
        }

        let request_id = request.id();
        let kind = request.kind();
        let accepted = self.transport.submit(request);
        if !accepted {
            warn!(request_id = %request_id, kind = ?kind, "dispatch.rejected");
        }
        accepted
    }
}
