use calc_queue_core::TaskId;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// In-memory FIFO of task ids waiting for a worker.
///
/// Records themselves live in the result backend; the queue only decides
/// claim order.
pub struct TaskQueue {
    ids: Mutex<VecDeque<TaskId>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            ids: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, task_id: TaskId) {
        self.ids.lock().push_back(task_id);
    }

    /// Take the oldest queued task
    pub fn pop(&self) -> Option<TaskId> {
        self.ids.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
