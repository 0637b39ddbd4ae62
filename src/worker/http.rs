//! HTTP client collaborator used by workers

use crate::config::HttpConfig;
use crate::humanize::ByteSize;
use crate::queue::{Method, Task};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request failed with status code {status}")]
    Status { status: u16 },

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid form body: {0}")]
    InvalidForm(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response body of {actual} bytes exceeds limit of {limit}")]
    BodyTooLarge { actual: u64, limit: ByteSize },
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Request body encoding
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Fully resolved HTTP request for one task
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: reqwest::Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    /// Resolve a task into a concrete request
    ///
    /// Plain URL tasks become a bare GET. Structured tasks forward their
    /// query, headers and timeout as request options; `data` becomes the
    /// body, url-encoded for the form variants and JSON otherwise.
    /// [`Method::Request`] reads its verb from `params.method`.
    pub fn from_task(task: &Task) -> Result<Self> {
        let url = Url::parse(task.url())
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", task.url(), e)))?;

        let Some(params) = task.params() else {
            return Ok(Self {
                method: reqwest::Method::GET,
                url,
                query: Vec::new(),
                headers: Vec::new(),
                body: RequestBody::Empty,
                timeout: None,
            });
        };

        let method = verb(task.method(), params.method.as_deref())?;

        let body = match &params.data {
            None => RequestBody::Empty,
            Some(data) if task.method().is_form() => RequestBody::Form(form_fields(data)?),
            Some(data) => RequestBody::Json(data.clone()),
        };

        Ok(Self {
            method,
            url,
            query: params
                .query
                .iter()
                .map(|(key, value)| (key.clone(), scalar_to_string(value)))
                .collect(),
            headers: params
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            body,
            timeout: params.timeout_ms.map(Duration::from_millis),
        })
    }
}

fn verb(method: Method, explicit: Option<&str>) -> Result<reqwest::Method> {
    Ok(match method {
        Method::Get => reqwest::Method::GET,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Post | Method::PostForm => reqwest::Method::POST,
        Method::Put | Method::PutForm => reqwest::Method::PUT,
        Method::Patch | Method::PatchForm => reqwest::Method::PATCH,
        Method::Request => {
            let name = explicit.unwrap_or("get").to_ascii_uppercase();
            reqwest::Method::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidMethod(name))?
        }
    })
}

fn form_fields(data: &Value) -> Result<Vec<(String, String)>> {
    let Value::Object(fields) = data else {
        return Err(FetchError::InvalidForm(format!("expected an object, got {data}")));
    };
    Ok(fields
        .iter()
        .map(|(key, value)| (key.clone(), scalar_to_string(value)))
        .collect())
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Successful HTTP response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    /// Whether the body carries no payload
    ///
    /// Blank bodies are empty. A body that parses as a JSON scalar is empty
    /// when that scalar is falsy: `null`, `false`, any zero, or `""`.
    /// Objects, arrays and non-JSON text always carry a payload.
    pub fn is_empty_result(&self) -> bool {
        let trimmed = self.body.trim_ascii();
        match trimmed.first() {
            None => true,
            Some(b'{' | b'[') => false,
            Some(_) => match serde_json::from_slice::<Value>(trimmed) {
                Ok(Value::Null | Value::Bool(false)) => true,
                Ok(Value::Number(n)) => n.as_f64() == Some(0.0),
                Ok(Value::String(s)) => s.is_empty(),
                _ => false,
            },
        }
    }
}

/// Executes prepared requests
///
/// Implementations perform exactly one attempt per call; the dispatcher
/// never retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: PreparedRequest) -> Result<FetchResponse>;
}

/// reqwest-backed [`Fetcher`]
pub struct ReqwestFetcher {
    client: Client,
    max_body_bytes: ByteSize,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn check_size(&self, actual: u64) -> Result<()> {
        if self.max_body_bytes.is_exceeded_by(actual) {
            return Err(FetchError::BodyTooLarge {
                actual,
                limit: self.max_body_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: PreparedRequest) -> Result<FetchResponse> {
        let url = request.url.to_string();
        debug!(url = url.as_str(), method = %request.method, "Sending request");

        let mut builder = self.client.request(request.method, request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            self.check_size(len)?;
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::RequestFailed(format!("Failed to read body: {}", e)))?;
        self.check_size(body.len() as u64)?;

        debug!(url = url.as_str(), status = status.as_u16(), size = body.len(), "Response received");

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_redirect() {
        FetchError::TooManyRedirects
    } else {
        FetchError::RequestFailed(e.to_string())
    }
}
