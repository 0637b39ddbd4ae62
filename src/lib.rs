pub mod config;
pub mod humanize;
pub mod observability;
pub mod queue;
pub mod worker;

pub use observability::RunSummary;
pub use queue::{Method, RequestParams, Task, TaskQueue, TaskSpec};
pub use worker::{Completion, Dispatcher, FetchError, Fetcher};
