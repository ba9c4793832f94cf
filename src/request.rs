use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::{Error, Result};

type Responder = oneshot::Sender<Result<Response>>;
type Parser<T> = Box<dyn FnOnce(Response) -> Result<T> + Send>;

/// Whether a request goes through refresh admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    /// The request that performs the token refresh. Always admitted immediately,
    /// since deferring it behind its own refresh cycle would never complete.
    Refresh,
}

/// A fully built request, ready to be handed to a [`Transport`](crate::Transport).
pub struct Request {
    id: Uuid,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    kind: RequestKind,
    authenticate: bool,
    responder: Option<Responder>,
}

impl Request {
    /// Creates a request and the handle its result will be delivered to.
    /// Dropping the [`Completion`] is fine when the caller does not care about the outcome.
    pub fn new(method: Method, url: Url) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            id: Uuid::new_v4(),
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            kind: RequestKind::Standard,
            authenticate: true,
            responder: Some(tx),
        };
        (request, Completion::new(rx))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Marks this request as the token refresh request itself.
    pub fn as_refresh(mut self) -> Self {
        self.kind = RequestKind::Refresh;
        self
    }

    /// Skips attaching the `Authorization` header from the current credential.
    pub fn without_auth(mut self) -> Self {
        self.authenticate = false;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn is_refresh(&self) -> bool {
        self.kind == RequestKind::Refresh
    }

    pub fn authenticate(&self) -> bool {
        self.authenticate
    }

    /// Delivers the final result to whoever holds the [`Completion`].
    /// Only the first call has an effect.
    pub fn complete(&mut self, result: Result<Response>) {
        if let Some(tx) = self.responder.take() {
            // The caller may have dropped its completion handle.
            let _ = tx.send(result);
        }
    }

    pub fn fail(mut self, err: Error) {
        self.complete(Err(err));
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A response the transport considered successful.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Receives the outcome of a dispatched [`Request`], optionally parsed into `T`.
pub struct Completion<T = Response> {
    rx: oneshot::Receiver<Result<Response>>,
    parse: Parser<T>,
}

impl Completion<Response> {
    fn new(rx: oneshot::Receiver<Result<Response>>) -> Self {
        Self {
            rx,
            parse: Box::new(|response: Response| -> Result<Response> { Ok(response) }),
        }
    }
}

impl<T: 'static> Completion<T> {
    /// Chains a parser applied once the response arrives.
    pub fn map_response<U, F>(self, f: F) -> Completion<U>
    where
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let parse = self.parse;
        Completion {
            rx: self.rx,
            parse: Box::new(move |response: Response| parse(response).and_then(f)),
        }
    }

    /// Waits for the request to finish.
    ///
    /// Resolves to [`Error::Cancelled`] if the request was dropped without a result,
    /// e.g. because the transport refused it.
    pub async fn wait(self) -> Result<T> {
        let response = self.rx.await.map_err(|_| Error::Cancelled)??;
        (self.parse)(response)
    }
}
