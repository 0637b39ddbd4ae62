use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type HeadersMap = BTreeMap<String, String>;

/// HTTP method a task is fetched with
///
/// The `*Form` variants send `data` url-encoded instead of as JSON.
/// `Request` takes its verb from [`RequestParams::method`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    #[default]
    Get,
    Delete,
    Head,
    Options,
    Post,
    Put,
    Patch,
    PostForm,
    PutForm,
    PatchForm,
    Request,
}

impl Method {
    pub fn is_form(self) -> bool {
        matches!(self, Method::PostForm | Method::PutForm | Method::PatchForm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Delete => "delete",
            Method::Head => "head",
            Method::Options => "options",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::PostForm => "postForm",
            Method::PutForm => "putForm",
            Method::PatchForm => "patchForm",
            Method::Request => "request",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task request options forwarded to the HTTP client
///
/// Serializes under the same keys it is read from, and keeps keys it does
/// not interpret in `extra`, so the JSON handed to the debug sink matches
/// what the task author wrote.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestParams {
    /// Query string parameters
    #[serde(rename = "params", alias = "query", skip_serializing_if = "Map::is_empty")]
    pub query: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: HeadersMap,
    /// Request body, url-encoded for the form methods and JSON otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "timeout", alias = "timeout_ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// HTTP verb used by [`Method::Request`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Client options with no dedicated field, e.g. `auth` or `responseType`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Structured fetch descriptor
#[derive(Debug, Clone, PartialEq, Builder, Deserialize, Serialize)]
pub struct TaskSpec {
    #[builder(into)]
    pub url: String,
    #[serde(default)]
    #[builder(default)]
    pub method: Method,
    #[serde(default)]
    #[builder(default)]
    pub params: RequestParams,
}

/// One unit of fetch work
///
/// Deserializes from either a bare JSON string (the URL) or a
/// `{ "url", "method", "params" }` object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Task {
    Url(String),
    Request(TaskSpec),
}

impl Task {
    pub fn url(&self) -> &str {
        match self {
            Task::Url(url) => url,
            Task::Request(spec) => &spec.url,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Task::Url(_) => Method::Get,
            Task::Request(spec) => spec.method,
        }
    }

    pub fn params(&self) -> Option<&RequestParams> {
        match self {
            Task::Url(_) => None,
            Task::Request(spec) => Some(&spec.params),
        }
    }

    /// Params serialized as JSON, `{}` when the task has none
    pub fn params_json(&self) -> String {
        self.params()
            .and_then(|params| serde_json::to_string(params).ok())
            .unwrap_or_else(|| "{}".to_string())
    }
}

impl From<&str> for Task {
    fn from(url: &str) -> Self {
        Task::Url(url.to_string())
    }
}

impl From<String> for Task {
    fn from(url: String) -> Self {
        Task::Url(url)
    }
}

impl From<TaskSpec> for Task {
    fn from(spec: TaskSpec) -> Self {
        Task::Request(spec)
    }
}

/// Parses one line of a task list: a JSON string or object, or a bare URL
impl FromStr for Task {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        if line.starts_with('{') || line.starts_with('"') {
            serde_json::from_str(line)
        } else {
            Ok(Task::Url(line.to_string()))
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.url())
    }
}
