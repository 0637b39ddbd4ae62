//! Worker loop - pops tasks until the queue runs dry

use super::dispatcher::{Pool, WorkerId};
use super::http::{FetchResponse, PreparedRequest};
use crate::queue::Task;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error};

/// A fetched task handed to the completion callback
///
/// `result` and `headers` are `None` when the fetch failed; that case only
/// reaches the callback with result checking disabled.
#[derive(Debug, Clone)]
pub struct Completion {
    pub task: Task,
    pub status: Option<StatusCode>,
    pub result: Option<Bytes>,
    pub headers: Option<HeaderMap>,
}

impl Completion {
    fn new(task: Task, response: Option<FetchResponse>) -> Self {
        match response {
            Some(response) => Self {
                task,
                status: Some(response.status),
                result: Some(response.body),
                headers: Some(response.headers),
            },
            None => Self {
                task,
                status: None,
                result: None,
                headers: None,
            },
        }
    }

    pub fn url(&self) -> &str {
        self.task.url()
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> Option<String> {
        self.result
            .as_ref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }

    /// Body parsed as JSON; `None` when absent or not valid for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        self.result
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get(name))
            .and_then(|value| value.to_str().ok())
    }
}

/// Retires its worker on drop, including when the callback unwinds
struct RetireGuard {
    pool: Arc<Pool>,
    worker_id: WorkerId,
}

impl Drop for RetireGuard {
    fn drop(&mut self) {
        self.pool.retire(self.worker_id);
    }
}

pub(super) async fn work(pool: Arc<Pool>, worker_id: WorkerId) {
    let _guard = RetireGuard {
        pool: Arc::clone(&pool),
        worker_id,
    };

    while let Some(task) = pool.queue.pop() {
        pool.metrics.task_popped();

        let response = fetch(&pool, worker_id, &task).await;

        if accepts(pool.check_result, response.as_ref()) {
            pool.metrics.result_delivered();
            (pool.on_complete)(Completion::new(task, response));
            pool.rescale();
        } else {
            pool.metrics.result_filtered();
            debug!(worker_id, url = task.url(), "Result filtered");
        }
    }

    debug!(worker_id, "Queue empty, worker exiting");
}

/// Fetch one task; failures are logged and yield `None`
async fn fetch(pool: &Pool, worker_id: WorkerId, task: &Task) -> Option<FetchResponse> {
    let url = task.url();

    if let Some(debugger) = &pool.debugger {
        debugger(url, &task.params_json());
    }
    debug!(worker_id, url, method = %task.method(), "Fetching task");

    let outcome = match PreparedRequest::from_task(task) {
        Ok(request) => pool.fetcher.fetch(request).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(response) => {
            pool.metrics.fetch_succeeded();
            Some(response)
        }
        Err(e) => {
            pool.metrics.fetch_failed();
            error!(worker_id, "Unable to fetch {}: {}!", url, e);
            None
        }
    }
}

/// Result check: with `check_result` only non-empty successful responses pass
fn accepts(check_result: bool, response: Option<&FetchResponse>) -> bool {
    !check_result || response.is_some_and(|response| !response.is_empty_result())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(body: &'static str) -> FetchResponse {
        let mut headers = HeaderMap::new();
        headers.insert("my-header-reply", HeaderValue::from_static("true"));
        FetchResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_accepts_policy() {
        assert!(accepts(true, Some(&response("foo"))));
        assert!(!accepts(true, Some(&response(""))));
        assert!(!accepts(true, Some(&response("0"))));
        assert!(!accepts(true, Some(&response("false"))));
        assert!(!accepts(true, Some(&response(r#""""#))));
        assert!(!accepts(true, Some(&response("null"))));
        assert!(!accepts(true, None));

        assert!(accepts(false, Some(&response("foo"))));
        assert!(accepts(false, Some(&response(""))));
        assert!(accepts(false, Some(&response("0"))));
        assert!(accepts(false, None));
    }

    #[test]
    fn test_completion_accessors() {
        let completion = Completion::new(
            Task::from("https://example.com/url"),
            Some(response(r#"{"urls":["https://example.com/foo"]}"#)),
        );

        assert_eq!(completion.url(), "https://example.com/url");
        assert_eq!(completion.status, Some(StatusCode::OK));
        assert_eq!(completion.header("my-header-reply"), Some("true"));

        #[derive(serde::Deserialize)]
        struct Links {
            urls: Vec<String>,
        }
        let links: Links = completion.json().unwrap();
        assert_eq!(links.urls, vec!["https://example.com/foo"]);
    }

    #[test]
    fn test_failed_completion_is_empty() {
        let completion = Completion::new(Task::from("https://example.com/gone"), None);
        assert!(completion.result.is_none());
        assert!(completion.text().is_none());
        assert!(completion.json::<serde_json::Value>().is_none());
        assert!(completion.header("anything").is_none());
    }
}
