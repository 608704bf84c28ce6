use crate::value::Value;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },
    #[error("`{function}` has no body and no native binding")]
    NoBody { function: String },
    #[error("call to suspend function `{function}` in a lowered program")]
    UnloweredSuspendCall { function: String },
    #[error("suspension requested outside of a stack in `{function}`")]
    SuspendOutsideStack { function: String },
    #[error("suspender `{value}` does not belong to the running stack")]
    ForeignSuspender { value: String },
    #[error("stack #{stack} is not suspended")]
    StackNotSuspended { stack: u32 },
    #[error("host completion #{completion} was resumed twice")]
    AlreadyCompleted { completion: u32 },
    #[error("expected {expected}, found `{found}`")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("value of `{name}` is not bound in `{function}`")]
    Unbound { name: String, function: String },
    #[error("call to `{function}` is missing argument {index}")]
    MissingArgument { function: String, index: usize },
    #[error("uncaught exception `{value}`")]
    Uncaught { value: String },
    #[error("return to `{target}` escaped its function")]
    StrayReturn { target: String },
    #[error("no export function for arity {arity}")]
    ExportArity { arity: usize },
}

impl EvalError {
    pub(crate) fn mismatch(expected: &'static str, found: &Value) -> Self {
        EvalError::TypeMismatch {
            expected,
            found: found.to_string(),
        }
    }
}
