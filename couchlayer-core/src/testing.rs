//! A scripted backend for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::{collections::VecDeque, sync::Mutex, time::Duration};

use crate::backend::{BackendError, HttpBackend, HttpRequest, HttpResponse, Method};

#[derive(Debug)]
enum Reply {
    Respond(HttpResponse),
    Fail(BackendError),
    Hang,
}

/// What the backend saw for one attempt.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
    pub content_type: Option<String>,
    pub timeout: Duration,
}

/// Answers requests from a fixed script, in order, and records them.
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: Value) -> Self {
        let body = serde_json::to_vec(&body).unwrap();
        self.push(Reply::Respond(HttpResponse::new(status, body)))
    }

    pub fn respond_empty(self, status: u16) -> Self {
        self.push(Reply::Respond(HttpResponse::new(status, Vec::new())))
    }

    pub fn fail(self, err: BackendError) -> Self {
        self.push(Reply::Fail(err))
    }

    pub fn hang(self) -> Self {
        self.push(Reply::Hang)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        let recorded = RecordedRequest {
            method: request.method,
            path: request.url.path().to_string(),
            query: request.url.query().map(str::to_string),
            body: request
                .body
                .as_deref()
                .map(|body| serde_json::from_slice(body).unwrap()),
            content_type: request.header("Content-Type").map(str::to_string),
            timeout: request.timeout,
        };
        self.requests.lock().unwrap().push(recorded);

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(BackendError::Request("script exhausted".into())),
        }
    }
}
