//! Where deferred work runs.
//!
//! Every promise holds a [`SharedScheduler`] and hands it the tasks that notify
//! observers. The scheduler must run them after the current synchronous turn has
//! unwound, in the order they were scheduled.
use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::Future,
    rc::Rc,
    task::{Context, Poll},
};

use futures::{
    executor::LocalSpawner,
    task::{noop_waker_ref, LocalSpawnExt},
};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Defers tasks until the current synchronous turn is over.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

pub type SharedScheduler = Rc<dyn Scheduler>;

/// A FIFO task queue the host drains explicitly.
///
/// Cloning yields another handle to the same queue.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Scheduler, TaskQueue};
/// use std::{cell::Cell, rc::Rc};
///
/// let queue = TaskQueue::new();
/// let ran = Rc::new(Cell::new(0));
/// let counter = ran.clone();
/// queue.schedule(Box::new(move || counter.set(counter.get() + 1)));
/// assert_eq!(ran.get(), 0);
/// assert_eq!(queue.run_until_idle(), 1);
/// assert_eq!(ran.get(), 1);
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler handle feeding this queue.
    pub fn scheduler(&self) -> SharedScheduler {
        Rc::new(self.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Runs the oldest task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // The borrow ends with this statement; the task may schedule more work.
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs at most `budget` tasks, including ones scheduled along the way.
    pub fn run_for(&self, budget: usize) -> usize {
        let mut ran = 0;
        while ran < budget && self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Runs tasks until none are left.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Polls `future`, running one queued task between polls.
    ///
    /// Returns `None` when the queue runs dry while the future is still pending,
    /// i.e. nothing left in this queue can ever complete it.
    pub fn block_on<F: Future>(&self, future: F) -> Option<F::Output> {
        futures::pin_mut!(future);
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Some(output);
            }
            if !self.run_next() {
                return None;
            }
        }
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.len()).finish()
    }
}

/// Runs promise tasks on a `futures` [`LocalPool`](futures::executor::LocalPool).
impl Scheduler for LocalSpawner {
    fn schedule(&self, task: Task) {
        if let Err(err) = self.spawn_local(async move { task() }) {
            tracing::warn!(%err, "local pool is shut down, dropping promise task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn push(log: &Rc<RefCell<Vec<u32>>>, n: u32) -> Task {
        let log = log.clone();
        Box::new(move || log.borrow_mut().push(n))
    }

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(vec![]));
        for n in 0..4 {
            queue.schedule(push(&log, n));
        }
        assert_eq!(queue.len(), 4);
        assert!(log.borrow().is_empty());
        assert_eq!(queue.run_until_idle(), 4);
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_tasks_scheduled_while_running_go_to_the_back() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(vec![]));
        let inner_queue = queue.clone();
        let inner_log = log.clone();
        queue.schedule(Box::new(move || {
            inner_log.borrow_mut().push(0);
            inner_queue.schedule(push(&inner_log, 2));
        }));
        queue.schedule(push(&log, 1));
        queue.run_until_idle();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_run_for_respects_budget() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(vec![]));
        for n in 0..5 {
            queue.schedule(push(&log, n));
        }
        assert_eq!(queue.run_for(2), 2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_for(10), 3);
        assert_eq!(queue.run_for(10), 0);
    }

    #[test]
    fn test_block_on_gives_up_when_idle() {
        let queue = TaskQueue::new();
        assert_eq!(queue.block_on(async { 7 }), Some(7));
        assert_eq!(queue.block_on(futures::future::pending::<()>()), None);
    }

    #[test]
    fn test_local_spawner_runs_tasks() {
        let mut pool = futures::executor::LocalPool::new();
        let spawner: SharedScheduler = Rc::new(pool.spawner());
        let log = Rc::new(RefCell::new(vec![]));
        spawner.schedule(push(&log, 1));
        spawner.schedule(push(&log, 2));
        assert!(log.borrow().is_empty());
        pool.run_until_stalled();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_local_spawner_queues_follow_ups_behind_pending_tasks() {
        let mut pool = futures::executor::LocalPool::new();
        let spawner: SharedScheduler = Rc::new(pool.spawner());
        let log = Rc::new(RefCell::new(vec![]));
        for n in 0..3 {
            let inner_spawner = spawner.clone();
            let inner_log = log.clone();
            spawner.schedule(Box::new(move || {
                inner_log.borrow_mut().push(n);
                inner_spawner.schedule(push(&inner_log, n + 10));
            }));
        }
        pool.run_until_stalled();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 10, 11, 12]);
    }
}
