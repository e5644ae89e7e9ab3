//! Awaiting a promise from async code.
//!
//! The future registers its reactions on first poll and parks a waker; the
//! scheduled flush stores the outcome and wakes it.
use std::{
    cell::RefCell,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use crate::{Promise, Value};

/// Resolves to `Ok(value)` or `Err(reason)` once the promise has settled and
/// its observers have been notified.
///
/// # Examples
///
/// ```
/// use futures::executor::LocalPool;
/// use promise_aplus::{Promise, SharedScheduler, Value};
/// use std::rc::Rc;
///
/// let mut pool = LocalPool::new();
/// let scheduler: SharedScheduler = Rc::new(pool.spawner());
/// let greeting = Promise::resolve(&scheduler, "hi");
/// assert_eq!(pool.run_until(greeting.settled()), Ok(Value::from("hi")));
/// ```
#[derive(Debug)]
pub struct Settled {
    promise: Promise,
    slot: Option<Rc<RefCell<Slot>>>,
}

#[derive(Debug, Default)]
struct Slot {
    outcome: Option<Result<Value, Value>>,
    waker: Option<Waker>,
}

impl Slot {
    fn complete(slot: &RefCell<Slot>, outcome: Result<Value, Value>) {
        let waker = {
            let mut slot = slot.borrow_mut();
            slot.outcome = Some(outcome);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake()
        }
    }
}

impl Promise {
    pub fn settled(&self) -> Settled {
        Settled {
            promise: self.clone(),
            slot: None,
        }
    }
}

impl IntoFuture for Promise {
    type Output = Result<Value, Value>;
    type IntoFuture = Settled;

    fn into_future(self) -> Settled {
        Settled {
            promise: self,
            slot: None,
        }
    }
}

impl Future for Settled {
    type Output = Result<Value, Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let slot = match self.slot.clone() {
            Some(slot) => slot,
            None => {
                let slot = Rc::new(RefCell::new(Slot::default()));
                let on_fulfilled = Rc::clone(&slot);
                let on_rejected = Rc::clone(&slot);
                self.promise.subscribe(
                    move |value| Slot::complete(&on_fulfilled, Ok(value)),
                    move |reason| Slot::complete(&on_rejected, Err(reason)),
                );
                self.slot = Some(Rc::clone(&slot));
                slot
            }
        };
        let mut slot = slot.borrow_mut();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
