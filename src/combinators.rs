//! Constructors and aggregators built on the settlement core.
use std::{cell::RefCell, rc::Rc};

use crate::{scheduler::SharedScheduler, Promise, Resolver, Status, Value};

/// A promise together with the capabilities that settle it, for producers that
/// live outside an executor.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Promise, Status, TaskQueue, Value};
///
/// let queue = TaskQueue::new();
/// let deferred = Promise::deferred(&queue.scheduler());
/// deferred.reject.call("nope");
/// deferred.resolve.call("too late");
/// assert_eq!(deferred.promise.status(), Status::Rejected);
/// assert_eq!(queue.block_on(deferred.promise.settled()), Some(Err(Value::from("nope"))));
/// ```
#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: Promise,
    pub resolve: Resolver,
    pub reject: Resolver,
}

struct Tally {
    results: Vec<Value>,
    fulfilled: usize,
}

impl Promise {
    /// A promise fulfilled with `value` as is. Promises and thenables are not
    /// unwrapped here, only by chaining.
    pub fn resolve(scheduler: &SharedScheduler, value: impl Into<Value>) -> Promise {
        let value = value.into();
        Promise::new(scheduler, move |resolve, _| {
            resolve.call(value);
            Ok(())
        })
    }

    /// A promise rejected with `reason` as is.
    pub fn reject(scheduler: &SharedScheduler, reason: impl Into<Value>) -> Promise {
        let reason = reason.into();
        Promise::new(scheduler, move |_, reject| {
            reject.call(reason);
            Ok(())
        })
    }

    pub fn deferred(scheduler: &SharedScheduler) -> Deferred {
        let promise = Promise::pending(scheduler);
        Deferred {
            resolve: promise.resolver(Status::Fulfilled),
            reject: promise.resolver(Status::Rejected),
            promise,
        }
    }

    /// Fulfills with a list of every input's value, in input order, once all of
    /// them have fulfilled. Rejects with the first rejection.
    ///
    /// Inputs that are not promises are wrapped with [`Promise::resolve`]. An
    /// empty input fulfills with an empty list.
    pub fn all<I>(scheduler: &SharedScheduler, inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs: Vec<Promise> = inputs
            .into_iter()
            .map(|input| Promise::cast(scheduler, input.into()))
            .collect();
        let aggregate = Promise::pending(scheduler);
        if inputs.is_empty() {
            aggregate.settle(Status::Fulfilled, Value::List(vec![]));
            return aggregate;
        }
        let total = inputs.len();
        let tally = Rc::new(RefCell::new(Tally {
            results: vec![Value::Undefined; total],
            fulfilled: 0,
        }));
        for (index, input) in inputs.into_iter().enumerate() {
            let tally = Rc::clone(&tally);
            let on_fulfilled = aggregate.clone();
            let on_rejected = aggregate.clone();
            input.subscribe(
                move |value| {
                    let complete = {
                        let mut tally = tally.borrow_mut();
                        tally.results[index] = value;
                        tally.fulfilled += 1;
                        if tally.fulfilled == total {
                            Some(std::mem::take(&mut tally.results))
                        } else {
                            None
                        }
                    };
                    if let Some(results) = complete {
                        on_fulfilled.settle(Status::Fulfilled, Value::List(results));
                    }
                },
                move |reason| {
                    on_rejected.settle(Status::Rejected, reason);
                },
            );
        }
        aggregate
    }

    /// Settles like whichever input settles first. The others keep running and
    /// their outcomes are dropped. An empty input never settles.
    pub fn race<I>(scheduler: &SharedScheduler, inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let aggregate = Promise::pending(scheduler);
        for input in inputs {
            let on_fulfilled = aggregate.clone();
            let on_rejected = aggregate.clone();
            Promise::cast(scheduler, input.into()).subscribe(
                move |value| {
                    on_fulfilled.settle(Status::Fulfilled, value);
                },
                move |reason| {
                    on_rejected.settle(Status::Rejected, reason);
                },
            );
        }
        aggregate
    }

    fn cast(scheduler: &SharedScheduler, value: Value) -> Promise {
        match value {
            Value::Promise(promise) => promise,
            other => Promise::resolve(scheduler, other),
        }
    }
}
