use crate::cli::FetchArgs;
use fetchpool::config::Config;
use fetchpool::observability;
use fetchpool::{Completion, Dispatcher, Task, TaskQueue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{error, info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}:{line}: invalid task: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

/// Links advertised by a JSON response
#[derive(Debug, Deserialize)]
struct DiscoveredLinks {
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OutputLine<'a> {
    url: &'a str,
    status: Option<u16>,
    bytes: Option<usize>,
    body: Option<String>,
}

impl<'a> From<&'a Completion> for OutputLine<'a> {
    fn from(completion: &'a Completion) -> Self {
        Self {
            url: completion.url(),
            status: completion.status.map(|status| status.as_u16()),
            bytes: completion.result.as_ref().map(|body| body.len()),
            body: completion.text(),
        }
    }
}

pub async fn run(args: FetchArgs) -> Result<(), AnyError> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    observability::init_tracing(&config.telemetry.log_filter);

    let mut dispatcher = Dispatcher::from_config(&config)?;
    if let Some(max_workers) = args.max_workers {
        dispatcher.set_max_workers(max_workers);
    }
    if args.no_check_result {
        dispatcher.set_check_result(false);
    }
    if args.debug {
        dispatcher.set_debugger(|url, params| eprintln!("fetch {} with {}", url, params));
    }

    let mut tasks: Vec<Task> = args.urls.into_iter().map(Task::from).collect();
    if let Some(path) = &args.input {
        tasks.extend(read_tasks(path)?);
    }
    if tasks.is_empty() {
        warn!("No tasks given, nothing to fetch");
        return Ok(());
    }

    let queue = TaskQueue::new();
    let follower = args
        .follow_json_urls
        .then(|| LinkFollower::new(queue.clone(), tasks.iter().map(Task::url)));
    queue.extend(tasks);

    let summary = dispatcher
        .run(&queue, move |completion| {
            if let Some(follower) = &follower {
                if let Some(links) = completion.json::<DiscoveredLinks>() {
                    let queued = follower.follow(links.urls);
                    info!(url = completion.url(), discovered = queued, "Queueing discovered links");
                    return;
                }
            }

            match serde_json::to_string(&OutputLine::from(&completion)) {
                Ok(line) => println!("{}", line),
                Err(e) => error!(url = completion.url(), error = %e, "Failed to encode result"),
            }
        })
        .await;

    info!(
        delivered = summary.delivered,
        failed = summary.failed,
        "Done"
    );
    Ok(())
}

/// Queues links discovered in responses, each URL at most once per run
///
/// Seeded with the initial task URLs so a seed that shows up as a link is
/// not fetched a second time.
struct LinkFollower {
    queue: TaskQueue,
    seen: Mutex<HashSet<String>>,
}

impl LinkFollower {
    fn new<'a>(queue: TaskQueue, seeds: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            queue,
            seen: Mutex::new(seeds.into_iter().map(str::to_string).collect()),
        }
    }

    /// Push the unseen `urls` onto the queue, returning how many were queued
    fn follow(&self, urls: Vec<String>) -> usize {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh: Vec<String> = urls
            .into_iter()
            .filter(|url| seen.insert(url.clone()))
            .collect();
        let queued = fresh.len();
        self.queue.extend(fresh);
        queued
    }
}

/// Read a task list: one URL or JSON task per line, `#` starts a comment
fn read_tasks(path: &Path) -> Result<Vec<Task>, InputError> {
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            line.parse::<Task>().map_err(|source| InputError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchpool::Method;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_tasks_mixed_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.txt");
        fs::write(
            &path,
            r#"# seed list
https://example.com/foo

{"url": "https://example.com/post", "method": "post", "params": {"data": {"a": 1}}}
"#,
        )
        .unwrap();

        let tasks = read_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0], Task::from("https://example.com/foo"));
        assert_eq!(tasks[1].method(), Method::Post);
    }

    #[test]
    fn test_read_tasks_reports_line_number() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.txt");
        fs::write(&path, "https://example.com/ok\n{\"method\": \"get\"}\n").unwrap();

        let err = read_tasks(&path).unwrap_err();
        assert!(matches!(err, InputError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_link_follower_skips_seeds_and_repeats() {
        let queue = TaskQueue::new();
        let follower = LinkFollower::new(queue.clone(), ["https://example.com/url"]);

        let queued = follower.follow(vec![
            "https://example.com/url".to_string(),
            "https://example.com/foo".to_string(),
            "https://example.com/foo".to_string(),
        ]);
        assert_eq!(queued, 1);
        assert_eq!(queue.pop(), Some(Task::from("https://example.com/foo")));
        assert!(queue.is_empty());

        assert_eq!(follower.follow(vec!["https://example.com/foo".to_string()]), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = read_tasks(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, InputError::Read { .. }));
    }
}
