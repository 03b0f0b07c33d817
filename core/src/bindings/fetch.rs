//! fetch(url, options)
//!
//! Returns a promise right away. The HTTP exchange runs on a background
//! thread owned by the `Fetcher`; its outcome comes back to the loop as an
//! IoCompletion task, so the promise is only ever settled on the loop thread.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error};

use crate::config::FetchConfig;
use crate::event_loop::{LoopHandle, Task, TaskBody};
use crate::interpreter::errors::{self, ErrorInfo};
use crate::interpreter::{val_to_json, DefineError, ExecError, Settlement, Val, Vm};

/* ===================== Fetcher ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// A completed HTTP exchange, including error statuses
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercased
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("network request failed: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to start fetch thread: {0}")]
    Spawn(String),
}

pub type FetchCallback = Box<dyn FnOnce(Result<FetchResponse, FetchError>) + Send + 'static>;

/// Performs requests off the loop thread
///
/// `fetch` must return without waiting for the exchange and call `done`
/// exactly once, from any thread other than the caller's.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: FetchRequest, done: FetchCallback);
}

/// `ureq` client, one thread per request
#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl Fetcher for UreqFetcher {
    fn fetch(&self, request: FetchRequest, done: FetchCallback) {
        let agent = self.agent.clone();
        let (tx, rx) = std::sync::mpsc::channel::<FetchCallback>();
        let spawned = thread::Builder::new()
            .name("jail-fetch".to_string())
            .spawn(move || {
                if let Ok(done) = rx.recv() {
                    done(perform(&agent, &request));
                }
            });
        match spawned {
            Ok(_) => {
                let _ = tx.send(done);
            }
            Err(e) => {
                error!("Failed to spawn fetch thread: {}", e);
                done(Err(FetchError::Spawn(e.to_string())));
            }
        }
    }
}

fn perform(agent: &ureq::Agent, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
    let mut call = agent.request(&request.method, &request.url);
    for (name, value) in &request.headers {
        call = call.set(name, value);
    }

    let result = match &request.body {
        Some(body) => call.send_string(body),
        None => call.call(),
    };

    // Error statuses still carry a response
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(FetchError::Transport(transport.to_string()))
        }
    };

    let status = response.status();
    let status_text = response.status_text().to_string();
    let url = response.get_url().to_string();
    let mut headers = BTreeMap::new();
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            headers.insert(name.to_lowercase(), value.to_string());
        }
    }
    let body = response
        .into_string()
        .map_err(|e| FetchError::Body(e.to_string()))?;

    Ok(FetchResponse {
        url,
        status,
        status_text,
        headers,
        body,
    })
}

/* ===================== Binding ===================== */

pub fn install(
    vm: &mut Vm,
    handle: &LoopHandle,
    fetcher: Arc<dyn Fetcher>,
) -> Result<(), DefineError> {
    let handle = handle.clone();
    vm.define_native("fetch", move |vm, args| {
        start_fetch(vm, &handle, fetcher.as_ref(), &args)
    })
}

fn start_fetch(
    vm: &mut Vm,
    handle: &LoopHandle,
    fetcher: &dyn Fetcher,
    args: &[Val],
) -> Result<Val, ExecError> {
    let promise = vm.create_promise();
    let request = match parse_request(args) {
        Ok(request) => request,
        Err(reason) => {
            vm.reject_promise(promise, reason)?;
            return Ok(Val::Promise(promise));
        }
    };

    debug!("fetch {} {}", request.method, request.url);
    let handle = handle.clone();
    fetcher.fetch(
        request,
        Box::new(move |outcome| {
            let settlement = match outcome {
                Ok(response) => Settlement::Fulfilled(response_value(response)),
                Err(e) => Settlement::Rejected(Val::Error(ErrorInfo::new(
                    errors::TYPE_ERROR,
                    e.to_string(),
                ))),
            };
            handle.post(Task::io_completion(TaskBody::Settle {
                promise,
                settlement,
            }));
        }),
    );
    Ok(Val::Promise(promise))
}

/// Read `(url, { method, headers, body })`; the error is the rejection reason
pub(crate) fn parse_request(args: &[Val]) -> Result<FetchRequest, Val> {
    let url = match args.first() {
        Some(Val::Str(url)) => url.clone(),
        other => {
            let got = other.map_or("undefined", Val::type_name);
            return Err(Val::Error(ErrorInfo::new(
                errors::TYPE_ERROR,
                format!("fetch: url must be a string, got {}", got),
            )));
        }
    };
    let mut request = FetchRequest::get(url);

    let Some(Val::Obj(options)) = args.get(1) else {
        return Ok(request);
    };
    if let Some(Val::Str(method)) = options.get("method") {
        request.method = method.to_uppercase();
    }
    if let Some(Val::Obj(headers)) = options.get("headers") {
        request.headers = headers
            .iter()
            .map(|(name, value)| (name.clone(), value.to_display_string()))
            .collect();
    }
    request.body = match options.get("body") {
        None | Some(Val::Undefined) | Some(Val::Null) => None,
        Some(Val::Str(body)) => Some(body.clone()),
        Some(value @ (Val::List(_) | Val::Obj(_))) => Some(val_to_json(value).to_string()),
        Some(other) => Some(other.to_display_string()),
    };
    Ok(request)
}

/// `{ ok, status, statusText, url, headers, body }`
pub(crate) fn response_value(response: FetchResponse) -> Val {
    let ok = response.ok();
    let headers = response
        .headers
        .into_iter()
        .map(|(name, value)| (name, Val::Str(value)))
        .collect();

    let mut object = BTreeMap::new();
    object.insert("ok".to_string(), Val::Bool(ok));
    object.insert("status".to_string(), Val::Num(response.status as f64));
    object.insert("statusText".to_string(), Val::Str(response.status_text));
    object.insert("url".to_string(), Val::Str(response.url));
    object.insert("headers".to_string(), Val::Obj(headers));
    object.insert("body".to_string(), Val::Str(response.body));
    Val::Obj(object)
}
