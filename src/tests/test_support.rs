use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use jiff::SignedDuration;
use reqwest::header::{AUTHORIZATION, HeaderMap, USER_AGENT};
use reqwest::{StatusCode, Url};
use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};

use crate::endpoint::{ResourcePoint, ResponseParser};
use crate::{Capabilities, Config, Credential, Dispatcher, Error, Request, Response, Transport};

/// What the transport saw for one request.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub refresh: bool,
    pub body: Option<String>,
}

/// Transport double that records submissions and answers each with `200 <path>`.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    seen: Arc<Mutex<Vec<Recorded>>>,
    refuse: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn seen(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.seen().into_iter().map(|r| r.path).collect()
    }

    pub fn refuse_all(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

fn header(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl Transport for RecordingTransport {
    fn submit(&self, mut request: Request) -> bool {
        if self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        let path = request.url().path().to_string();
        self.seen.lock().unwrap().push(Recorded {
            path: path.clone(),
            query: request.url().query().map(str::to_string),
            authorization: header(request.headers(), AUTHORIZATION),
            user_agent: header(request.headers(), USER_AGENT),
            refresh: request.is_refresh(),
            body: request
                .body()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        });
        request.complete(Ok(Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: path.into_bytes(),
        }));
        true
    }
}

/// Resource point at `https://api.test/<template>` where `{name}` segments are
/// filled from path params. Parses the body as text.
pub struct TextPoint {
    pub template: &'static str,
}

impl ResourcePoint for TextPoint {
    type Output = String;

    fn url(&self, path_params: &HashMap<String, String>, _encoding: &str) -> Result<Url, Error> {
        let mut path = self.template.to_string();
        for (name, value) in path_params {
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }
        Url::parse("https://api.test")
            .and_then(|base| base.join(&path))
            .map_err(|e| Error::Encoding(e.to_string()))
    }

    fn response_parser(&self) -> ResponseParser<String> {
        Arc::new(|response: Response| Ok(response.text()))
    }
}

pub fn test_config() -> Config {
    Config {
        app_name: "dispatch-tests".into(),
        app_version: "9.9.9".into(),
        ..Config::default()
    }
}

pub fn armed_dispatcher(transport: &RecordingTransport) -> Arc<Dispatcher> {
    let dispatcher = Arc::new(Dispatcher::new());
    let transport = transport.clone();
    dispatcher
        .initialize(&test_config(), move |_| Ok(Capabilities::new(transport)))
        .expect("initialize");
    dispatcher
}

pub fn bearer_expiring_in(token: &str, secs: i64) -> Credential {
    Credential::bearer_expiring_in(token, SignedDuration::from_secs(secs))
}

/// Registers a refresh trigger that only counts invocations.
pub fn counting_refresh(dispatcher: &Dispatcher, credential: Credential) -> Arc<AtomicUsize> {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    dispatcher
        .set_credentials_with_refresh(credential, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("set credentials");
    fired
}

struct VecWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl std::io::Write for VecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.lines.lock().unwrap();
        guard.push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn make_subscriber(lines: Arc<Mutex<Vec<String>>>) -> impl tracing::Subscriber + Send + Sync {
    let writer_lines = lines.clone();
    Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    )
}

pub fn capture_logs() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let guard = set_default(make_subscriber(lines.clone()));
    (lines, guard)
}

pub fn drain_logs(lines: Arc<Mutex<Vec<String>>>) -> Vec<String> {
    Arc::try_unwrap(lines).unwrap().into_inner().unwrap()
}
