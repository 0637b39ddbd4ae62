pub mod store;
pub mod task;

pub use store::TaskQueue;
pub use task::{HeadersMap, Method, RequestParams, Task, TaskSpec};
