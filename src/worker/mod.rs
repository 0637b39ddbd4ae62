//! Fetch worker pool
//!
//! [`Dispatcher`] runs a dynamically sized set of workers against a shared
//! [`TaskQueue`](crate::queue::TaskQueue). Each worker pops a task, fetches
//! it through a [`Fetcher`], and passes the [`Completion`] to the caller.

pub mod dispatcher;
pub mod http;
pub mod runner;

pub use dispatcher::{DebugSink, Dispatcher, WorkerId};
pub use http::{FetchError, FetchResponse, Fetcher, PreparedRequest, ReqwestFetcher, RequestBody};
pub use runner::Completion;
