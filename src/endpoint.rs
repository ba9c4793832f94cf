//! Resource points: named endpoints the dispatcher can fire at.
//!
//! Path templating and response parsing belong to the [`ResourcePoint`]
//! implementation. This module only places request parameters, in the query
//! string for reads and in a form-encoded body for writes.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

use crate::errors::{Error, Result};
use crate::request::Response;

pub type ResponseParser<T> = Arc<dyn Fn(Response) -> Result<T> + Send + Sync>;

pub trait ResourcePoint: Send + Sync {
    type Output: Send + 'static;

    /// Resolves the endpoint's path template into a concrete URL.
    fn url(&self, path_params: &HashMap<String, String>, encoding: &str) -> Result<Url>;

    fn response_parser(&self) -> ResponseParser<Self::Output>;
}

/// One call against a [`ResourcePoint`].
#[derive(Clone, Debug)]
pub struct EndpointCall {
    pub(crate) method: Method,
    pub(crate) path_params: HashMap<String, String>,
    pub(crate) headers: HeaderMap,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) encoding: Option<String>,
}

impl EndpointCall {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path_params: HashMap::new(),
            headers: HeaderMap::new(),
            params: Vec::new(),
            encoding: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Overrides the configured params encoding for this call.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Only UTF-8 is supported for URL and body construction.
pub(crate) fn ensure_supported_encoding(encoding: &str) -> Result<()> {
    match encoding.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "utf8" => Ok(()),
        _ => Err(Error::Encoding(format!(
            "unsupported params encoding '{encoding}'"
        ))),
    }
}

pub(crate) fn form_encode(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Where the parameters of a call end up.
pub(crate) struct Placement {
    pub url: Url,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<HeaderValue>,
}

pub(crate) fn place_params(method: &Method, mut url: Url, params: &[(String, String)]) -> Placement {
    if params.is_empty() {
        return Placement {
            url,
            body: None,
            content_type: None,
        };
    }
    let encoded = form_encode(params);
    if *method == Method::GET || *method == Method::HEAD {
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
            _ => encoded,
        };
        url.set_query(Some(&query));
        Placement {
            url,
            body: None,
            content_type: None,
        }
    } else {
        Placement {
            url,
            body: Some(encoded.into_bytes()),
            content_type: Some(HeaderValue::from_static(
                "application/x-www-form-urlencoded; charset=UTF-8",
            )),
        }
    }
}

pub(crate) fn apply_content_type(headers: &mut HeaderMap, content_type: Option<HeaderValue>) {
    if let Some(value) = content_type {
        headers.entry(CONTENT_TYPE).or_insert(value);
    }
}
