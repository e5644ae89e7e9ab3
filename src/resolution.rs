//! Turning a handler's return value into the settlement of the next promise.
//!
//! Promises and foreign thenables are unwrapped until a plain value or a
//! rejection comes out. A thenable that synchronously hands back another
//! thenable does not recurse: its continuation queues the new value on the
//! procedure's work list and the loop in [`Procedure::feed`] picks it up.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use crate::{Error, Promise, Resolver, Status, Value};

/// Settles `target` with `x`, unwrapping promises and thenables.
pub(crate) fn resolve_into(target: &Promise, x: Value) {
    let procedure = Rc::new(Procedure {
        target: target.clone(),
        work: RefCell::new(VecDeque::new()),
        running: Cell::new(false),
    });
    procedure.feed(x);
}

struct Procedure {
    target: Promise,
    work: RefCell<VecDeque<Value>>,
    running: Cell<bool>,
}

impl Procedure {
    fn feed(self: &Rc<Self>, x: Value) {
        self.work.borrow_mut().push_back(x);
        if self.running.replace(true) {
            return;
        }
        loop {
            let next = self.work.borrow_mut().pop_front();
            let Some(x) = next else { break };
            self.step(x);
        }
        self.running.set(false);
    }

    fn step(self: &Rc<Self>, x: Value) {
        let target = &self.target;
        match x {
            Value::Promise(ref p) if p.ptr_eq(target) => {
                tracing::debug!("promise resolved with itself");
                target.settle(Status::Rejected, Value::Error(Error::SelfResolution));
            }
            Value::Promise(p) => {
                let (resolve, reject, _) = self.continuations();
                p.subscribe(move |y| resolve.call(y), move |r| reject.call(r));
            }
            Value::Object(object) => match object.then_method() {
                Err(reason) => {
                    tracing::debug!(?object, "reading `then` failed");
                    target.settle(Status::Rejected, reason);
                }
                Ok(None) => {
                    target.settle(Status::Fulfilled, Value::Object(object));
                }
                Ok(Some(then)) => {
                    tracing::trace!(?object, "assimilating thenable");
                    let (resolve, reject, committed) = self.continuations();
                    if let Err(reason) = then(resolve, reject) {
                        if !committed.replace(true) {
                            target.settle(Status::Rejected, reason);
                        }
                    }
                }
            },
            x => {
                target.settle(Status::Fulfilled, x);
            }
        }
    }

    /// A fulfill and a reject continuation of which only the first call counts.
    fn continuations(self: &Rc<Self>) -> (Resolver, Resolver, Rc<Cell<bool>>) {
        let committed = Rc::new(Cell::new(false));
        let resolve = {
            let this = Rc::clone(self);
            let committed = Rc::clone(&committed);
            Resolver::new(move |y| {
                if !committed.replace(true) {
                    this.feed(y);
                }
            })
        };
        let reject = {
            let this = Rc::clone(self);
            let committed = Rc::clone(&committed);
            Resolver::new(move |r| {
                if !committed.replace(true) {
                    this.target.settle(Status::Rejected, r);
                }
            })
        };
        (resolve, reject, committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scheduler::SharedScheduler, TaskQueue, ThenMethod, Thenable};

    fn setup() -> (TaskQueue, SharedScheduler) {
        let queue = TaskQueue::new();
        let scheduler = queue.scheduler();
        (queue, scheduler)
    }

    #[derive(Debug)]
    struct ThrowingAccessor;

    impl Thenable for ThrowingAccessor {
        fn then_method(&self) -> Result<Option<ThenMethod>, Value> {
            Err("no then for you".into())
        }
    }

    #[derive(Debug)]
    struct NotCallable;

    impl Thenable for NotCallable {
        fn then_method(&self) -> Result<Option<ThenMethod>, Value> {
            Ok(None)
        }
    }

    #[test]
    fn test_plain_value_fulfills_synchronously() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(&target, 3.into());
        assert_eq!(target.value(), Some(Value::from(3)));
    }

    #[test]
    fn test_self_resolution_rejects() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(&target, Value::Promise(target.clone()));
        assert_eq!(target.status(), Status::Rejected);
        assert_eq!(target.value(), Some(Value::Error(Error::SelfResolution)));
    }

    #[test]
    fn test_throwing_accessor_rejects() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(&target, Value::Object(Rc::new(ThrowingAccessor)));
        assert_eq!(target.status(), Status::Rejected);
        assert_eq!(target.value(), Some(Value::from("no then for you")));
    }

    #[test]
    fn test_non_callable_then_fulfills_with_the_object() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        let object = Value::Object(Rc::new(NotCallable));
        resolve_into(&target, object.clone());
        assert_eq!(target.status(), Status::Fulfilled);
        assert_eq!(target.value(), Some(object));
    }

    #[test]
    fn test_only_the_first_continuation_counts() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(
            &target,
            Value::thenable(|resolve, reject| {
                resolve.call(1);
                reject.call(2);
                resolve.call(3);
                Err(4.into())
            }),
        );
        assert_eq!(target.status(), Status::Fulfilled);
        assert_eq!(target.value(), Some(Value::from(1)));
    }

    #[test]
    fn test_error_after_reject_keeps_the_rejection() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(
            &target,
            Value::thenable(|_, reject| {
                reject.call("first");
                Err("second".into())
            }),
        );
        assert_eq!(target.value(), Some(Value::from("first")));
    }

    #[test]
    fn test_error_before_any_call_rejects() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(&target, Value::thenable(|_, _| Err("thrown".into())));
        assert_eq!(target.status(), Status::Rejected);
        assert_eq!(target.value(), Some(Value::from("thrown")));
    }

    #[test]
    fn test_late_continuation_settles_target() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        let saved: Rc<RefCell<Option<Resolver>>> = Rc::default();
        let slot = saved.clone();
        resolve_into(
            &target,
            Value::thenable(move |resolve, _| {
                *slot.borrow_mut() = Some(resolve);
                Ok(())
            }),
        );
        assert_eq!(target.status(), Status::Pending);
        let resolve = saved.borrow_mut().take();
        if let Some(resolve) = resolve {
            resolve.call("later");
        }
        assert_eq!(target.value(), Some(Value::from("later")));
    }

    fn countdown(n: u32) -> Value {
        Value::thenable(move |resolve, _| {
            if n == 0 {
                resolve.call("bottom");
            } else {
                resolve.call(countdown(n - 1));
            }
            Ok(())
        })
    }

    #[test]
    fn test_long_synchronous_thenable_chain_does_not_recurse() {
        let (_queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        resolve_into(&target, countdown(200_000));
        assert_eq!(target.value(), Some(Value::from("bottom")));
    }

    #[test]
    fn test_nested_promise_is_followed() {
        let (queue, scheduler) = setup();
        let target = Promise::pending(&scheduler);
        let inner = Promise::pending(&scheduler);
        resolve_into(&target, Value::Promise(inner.clone()));
        assert_eq!(target.status(), Status::Pending);
        inner.settle(Status::Rejected, "inner failed".into());
        queue.run_until_idle();
        assert_eq!(target.status(), Status::Rejected);
        assert_eq!(target.value(), Some(Value::from("inner failed")));
    }
}
