use std::fmt;
use std::rc::Rc;

use coro_ir::FunctionId;
use coro_types::ClassId;

use crate::frame::Frame;

/// Identifies one stack created for an export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackId(pub u32);

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    /// Singleton instance of an object class.
    Object(ClassId),
    Function(FunctionValue),
    /// The "suspended" sentinel.
    Suspended,
    /// Stack-switch capability of one stack.
    Suspender(StackId),
    /// Continuation that resumes a suspended stack.
    Coroutine(StackId),
    /// Continuation owned by the host; outcomes delivered to it are recorded.
    HostCompletion(u32),
    Outcome(Rc<Outcome>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(class) => write!(f, "object#{}", class.0),
            Value::Function(function) => write!(f, "fn#{}", function.function.0),
            Value::Suspended => write!(f, "COROUTINE_SUSPENDED"),
            Value::Suspender(stack) => write!(f, "suspender#{}", stack.0),
            Value::Coroutine(stack) => write!(f, "coroutine#{}", stack.0),
            Value::HostCompletion(id) => write!(f, "completion#{id}"),
            Value::Outcome(outcome) => match &**outcome {
                Outcome::Success(v) => write!(f, "Success({v})"),
                Outcome::Failure(e) => write!(f, "Failure({e})"),
            },
        }
    }
}

/// A function value, with the frame it closes over when it is local.
#[derive(Clone)]
pub struct FunctionValue {
    pub function: FunctionId,
    pub(crate) env: Option<Rc<Frame>>,
}

impl FunctionValue {
    pub fn new(function: FunctionId) -> Self {
        Self { function, env: None }
    }
}

impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function
            && match (&self.env, &other.env) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("function", &self.function)
            .field("closure", &self.env.is_some())
            .finish()
    }
}

/// What a continuation is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(Value),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn value(&self) -> &Value {
        match self {
            Outcome::Success(v) | Outcome::Failure(v) => v,
        }
    }
}
