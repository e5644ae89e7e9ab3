//! Promises/A+ style deferred values for single-threaded hosts.
//!
//! A [`Promise`] is settled once, by its executor or through a [`Deferred`], and
//! notifies observers through an injected [`Scheduler`], never in the turn that
//! registered or settled them. Handler results that are themselves promises or
//! foreign [`Thenable`]s are unwrapped before the next link settles.
//!
//! # Examples
//!
//! ```
//! use promise_aplus::{Promise, TaskQueue, Value};
//!
//! let queue = TaskQueue::new();
//! let scheduler = queue.scheduler();
//! let doubled = Promise::resolve(&scheduler, 21).and_then(|v| match v {
//!     Value::Number(n) => Ok(Value::Number(n * 2.0)),
//!     other => Err(other),
//! });
//! assert_eq!(queue.block_on(doubled.settled()), Some(Ok(Value::from(42))));
//! ```
use std::fmt;

use thiserror::Error;

mod combinators;
mod future;
mod promise;
mod resolution;
pub mod scheduler;
mod value;

pub use combinators::Deferred;
pub use future::Settled;
pub use promise::{Handler, Promise};
pub use scheduler::{Scheduler, SharedScheduler, Task, TaskQueue};
pub use value::{FnThenable, Resolver, ThenMethod, Thenable, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("the promise and its value refer to the same object")]
    SelfResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

impl Status {
    pub fn is_settled(self) -> bool {
        self != Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "pending",
            Status::Fulfilled => "fulfilled",
            Status::Rejected => "rejected",
        })
    }
}
