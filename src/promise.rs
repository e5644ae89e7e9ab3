//! The settlement state machine and the chaining layer built on it.
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use crate::{resolution, scheduler::SharedScheduler, Resolver, Status, Value};

/// A fulfillment or rejection handler. Returning `Err` counts as throwing.
pub type Handler = Box<dyn FnOnce(Value) -> Result<Value, Value>>;

type Reaction = Box<dyn FnOnce(Value)>;

struct Reactions {
    fulfilled: Vec<Reaction>,
    rejected: Vec<Reaction>,
}

struct Inner {
    status: Status,
    value: Value,
    // `None` once flushed.
    reactions: Option<Reactions>,
}

/// A value or error that is not known yet.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    scheduler: SharedScheduler,
}

impl Promise {
    /// Creates a pending promise and runs `executor` with its resolve and reject
    /// capabilities. An `Err` from the executor rejects the promise.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{Promise, Status, TaskQueue, Value};
    ///
    /// let queue = TaskQueue::new();
    /// let failed = Promise::new(&queue.scheduler(), |_resolve, _reject| Err("bad".into()));
    /// assert_eq!(failed.status(), Status::Rejected);
    /// assert_eq!(queue.block_on(failed.settled()), Some(Err(Value::from("bad"))));
    /// ```
    pub fn new<F>(scheduler: &SharedScheduler, executor: F) -> Self
    where
        F: FnOnce(Resolver, Resolver) -> Result<(), Value>,
    {
        let promise = Self::pending(scheduler);
        let resolve = promise.resolver(Status::Fulfilled);
        let reject = promise.resolver(Status::Rejected);
        if let Err(reason) = executor(resolve, reject) {
            promise.settle(Status::Rejected, reason);
        }
        promise
    }

    pub(crate) fn pending(scheduler: &SharedScheduler) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                status: Status::Pending,
                value: Value::Undefined,
                reactions: Some(Reactions {
                    fulfilled: vec![],
                    rejected: vec![],
                }),
            })),
            scheduler: Rc::clone(scheduler),
        }
    }

    /// A capability settling this promise into `state`.
    pub(crate) fn resolver(&self, state: Status) -> Resolver {
        let promise = self.clone();
        Resolver::new(move |value| {
            promise.settle(state, value);
        })
    }

    /// Moves a pending promise into `state` and schedules the flush of its
    /// reactions. Returns `false` if it had already settled.
    pub(crate) fn settle(&self, state: Status, value: Value) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.status.is_settled() {
                return false;
            }
            inner.status = state;
            inner.value = value.clone();
        }
        tracing::trace!(%state, "promise settled");
        let inner = Rc::clone(&self.inner);
        self.scheduler
            .schedule(Box::new(move || flush(&inner, state, value)));
        true
    }

    /// Registers raw reactions. They run on a later task, never inside this call.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(Value) + 'static,
        R: FnOnce(Value) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let status = inner.status;
        match status {
            Status::Pending => {
                if let Some(reactions) = inner.reactions.as_mut() {
                    reactions.fulfilled.push(Box::new(on_fulfilled));
                    reactions.rejected.push(Box::new(on_rejected));
                }
            }
            Status::Fulfilled | Status::Rejected => {
                let value = inner.value.clone();
                drop(inner);
                self.scheduler.schedule(Box::new(move || {
                    if status == Status::Fulfilled {
                        on_fulfilled(value)
                    } else {
                        on_rejected(value)
                    }
                }));
            }
        }
    }

    /// Chains handlers onto this promise.
    ///
    /// A missing `on_fulfilled` passes the value through; a missing
    /// `on_rejected` passes the reason through. Whatever the chosen handler
    /// returns settles the returned promise, after unwrapping promises and
    /// thenables.
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let next = Promise::pending(&self.scheduler);
        let link = Rc::new(Link {
            on_fulfilled: Cell::new(on_fulfilled),
            on_rejected: Cell::new(on_rejected),
            next: next.clone(),
        });
        let on_rejected = Rc::clone(&link);
        self.subscribe(
            move |value| link.invoke(Status::Fulfilled, value),
            move |reason| on_rejected.invoke(Status::Rejected, reason),
        );
        next
    }

    pub fn and_then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        let on_fulfilled: Handler = Box::new(on_fulfilled);
        self.then(Some(on_fulfilled), None)
    }

    pub fn catch<F>(&self, on_rejected: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        let on_rejected: Handler = Box::new(on_rejected);
        self.then(None, Some(on_rejected))
    }

    /// Runs `on_finally` on either outcome, then passes the original value or
    /// reason on.
    ///
    /// If `on_finally` fails, or returns a thenable that rejects, that reason
    /// replaces the original outcome. A thenable result is waited for before
    /// the original outcome moves on.
    pub fn finally<F>(&self, on_finally: F) -> Promise
    where
        F: FnOnce() -> Result<Value, Value> + 'static,
    {
        let on_finally = Rc::new(Cell::new(Some(on_finally)));
        let scheduler = Rc::clone(&self.scheduler);
        let after = Rc::new(move |outcome: Result<Value, Value>| -> Result<Value, Value> {
            let x = match on_finally.take() {
                Some(on_finally) => on_finally()?,
                None => Value::Undefined,
            };
            let gate = Promise::pending(&scheduler);
            resolution::resolve_into(&gate, x);
            Ok(Value::Promise(gate.and_then(move |_| outcome)))
        });
        let settle_rejected = Rc::clone(&after);
        let on_fulfilled: Handler = Box::new(move |value: Value| after(Ok(value)));
        let on_rejected: Handler = Box::new(move |reason: Value| settle_rejected(Err(reason)));
        self.then(Some(on_fulfilled), Some(on_rejected))
    }

    pub fn status(&self) -> Status {
        self.inner.borrow().status
    }

    /// The settled value or reason, `None` while pending.
    pub fn value(&self) -> Option<Value> {
        let inner = self.inner.borrow();
        if inner.status.is_settled() {
            Some(inner.value.clone())
        } else {
            None
        }
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Promise");
        s.field("id", &Rc::as_ptr(&self.inner));
        match self.inner.try_borrow() {
            Ok(inner) => s.field("status", &inner.status),
            Err(_) => s.field("status", &"<borrowed>"),
        };
        s.finish()
    }
}

fn flush(inner: &RefCell<Inner>, state: Status, value: Value) {
    let reactions = inner.borrow_mut().reactions.take();
    let Some(Reactions {
        fulfilled,
        rejected,
    }) = reactions
    else {
        return;
    };
    let queue = if state == Status::Fulfilled {
        fulfilled
    } else {
        rejected
    };
    if state == Status::Rejected && queue.is_empty() {
        tracing::debug!(reason = ?value, "rejection flushed with no observers");
    }
    for reaction in queue {
        reaction(value.clone());
    }
}

/// The handlers of one `then` call and the promise they settle.
struct Link {
    on_fulfilled: Cell<Option<Handler>>,
    on_rejected: Cell<Option<Handler>>,
    next: Promise,
}

impl Link {
    fn invoke(&self, state: Status, value: Value) {
        let handler = if state == Status::Fulfilled {
            self.on_fulfilled.take()
        } else {
            self.on_rejected.take()
        };
        let outcome = match handler {
            Some(handler) => handler(value),
            None if state == Status::Fulfilled => Ok(value),
            None => Err(value),
        };
        match outcome {
            Ok(x) => resolution::resolve_into(&self.next, x),
            Err(reason) => {
                self.next.settle(Status::Rejected, reason);
            }
        }
    }
}
