use std::{fmt, rc::Rc};

use crate::{Error, Promise};

/// A settlement capability: calling it resolves or rejects whatever it is bound to.
///
/// Resolvers handed out by a promise are idempotent; only the first call to
/// either of a pair has any effect.
#[derive(Clone)]
pub struct Resolver(Rc<dyn Fn(Value)>);

impl Resolver {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, value: impl Into<Value>) {
        (self.0)(value.into())
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver")
    }
}

/// The `then` operation read off a thenable, ready to be called once with a
/// fulfill and a reject continuation. `Err` means the call threw.
pub type ThenMethod = Box<dyn FnOnce(Resolver, Resolver) -> Result<(), Value>>;

/// A foreign object that may carry a `then` operation.
pub trait Thenable: fmt::Debug {
    /// Reads the `then` capability.
    ///
    /// `Err(reason)` means reading it threw. `Ok(None)` means there is nothing
    /// callable, and the object is then an ordinary value.
    fn then_method(&self) -> Result<Option<ThenMethod>, Value>;
}

/// A thenable whose `then` is a closure.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Promise, TaskQueue, Value};
///
/// let queue = TaskQueue::new();
/// let scheduler = queue.scheduler();
/// let answer = Promise::resolve(&scheduler, ())
///     .and_then(|_| Ok(Value::thenable(|resolve, _| {
///         resolve.call(42);
///         Ok(())
///     })));
/// assert_eq!(queue.block_on(answer.settled()), Some(Ok(Value::from(42))));
/// ```
#[derive(Clone)]
pub struct FnThenable {
    then: Rc<dyn Fn(Resolver, Resolver) -> Result<(), Value>>,
}

impl FnThenable {
    pub fn new<F>(then: F) -> Self
    where
        F: Fn(Resolver, Resolver) -> Result<(), Value> + 'static,
    {
        Self { then: Rc::new(then) }
    }
}

impl Thenable for FnThenable {
    fn then_method(&self) -> Result<Option<ThenMethod>, Value> {
        let then = Rc::clone(&self.then);
        Ok(Some(Box::new(move |resolve: Resolver, reject: Resolver| {
            then(resolve, reject)
        })))
    }
}

impl fmt::Debug for FnThenable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnThenable")
    }
}

/// What a promise fulfills or rejects with.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Error(Error),
    /// A composite foreign object, possibly thenable.
    Object(Rc<dyn Thenable>),
    Promise(Promise),
}

impl Value {
    pub fn thenable<F>(then: F) -> Self
    where
        F: Fn(Resolver, Resolver) -> Result<(), Value> + 'static,
    {
        Value::Object(Rc::new(FnThenable::new(then)))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }
}

/// Plain data compares structurally, objects and promises by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

/// Numbers are IEEE doubles: integers beyond 2^53 round to the nearest
/// representable `f64`, the same as a JS number literal would.
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(err)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}
