use super::task::Task;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared FIFO of pending tasks
///
/// Cloning yields another handle to the same queue, so a completion
/// callback can capture a clone and push newly discovered work while a
/// run is draining it. `pop` takes the head under the lock, so two
/// workers never receive the same task.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the tail
    pub fn push(&self, task: impl Into<Task>) {
        self.lock().push_back(task.into());
    }

    pub fn extend<I, T>(&self, tasks: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        self.lock().extend(tasks.into_iter().map(Into::into));
    }

    /// Remove and return the head, or `None` when empty
    pub fn pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        // Critical sections never panic midway, so a poisoned queue is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Into<Task>> FromIterator<T> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let queue = TaskQueue::new();
        queue.extend(iter);
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fifo_order() {
        let queue: TaskQueue = ["a", "b", "c"].into_iter().collect();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(Task::from("a")));
        assert_eq!(queue.pop(), Some(Task::from("b")));
        assert_eq!(queue.pop(), Some(Task::from("c")));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let queue = TaskQueue::new();
        let handle = queue.clone();
        handle.push("https://example.com/foo");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|t| t.url().to_string()), Some("https://example.com/foo".to_string()));
        assert!(handle.is_empty());
    }

    #[test]
    fn test_concurrent_pop_is_exclusive() {
        let queue: TaskQueue = (0..1000).map(|i| format!("task-{i}")).collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(task) = queue.pop() {
                        seen.push(task.url().to_string());
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut total = 0;
        for handle in handles {
            let seen = handle.join().unwrap();
            total += seen.len();
            all.extend(seen);
        }

        assert_eq!(total, 1000);
        assert_eq!(all.len(), 1000);
    }
}
