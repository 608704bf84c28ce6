//! Reference evaluator for lowered programs.
//!
//! Each export call runs on its own machine stack (`corosensei`). The
//! suspend primitive switches back to the host; resuming the stack's
//! coroutine continues it where it stopped. Outcomes delivered to
//! host-owned completions are recorded and can be inspected.

mod error;
mod frame;
mod interp;
mod runtime;
mod value;

pub use error::EvalError;
pub use runtime::{Evaluator, NativeFn};
pub use value::{FunctionValue, Outcome, StackId, Value};
