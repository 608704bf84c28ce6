//! Lowering of suspend functions to explicit stack switching.
//!
//! Every suspend function is replaced by a plain twin that takes two extra
//! trailing parameters: the completion that receives its outcome and the
//! suspender used to switch stacks. Bodies are then rewritten so that calls,
//! resumptions and the suspend intrinsic go through those parameters, and
//! the runtime's export functions become trampolines the host can call.
//!
//! [`lower_program`] runs the whole pipeline over one compilation unit;
//! [`lower_units`] runs it over several and isolates failures per unit.

pub mod body;
pub mod builtins;
pub mod call_sites;
pub mod config;
pub mod error;
pub mod exports;
pub mod pipeline;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod resume;
pub mod stubs;
pub mod suspend_intrinsic;
pub mod verify;

pub use body::{BodyContext, BodyLowering, StubFrame};
pub use builtins::Builtins;
pub use config::{BodyPass, BuiltinNames, IntrinsicPolicy, LoweringConfig};
pub use error::{LowerError, LowerErrorKind};
pub use pipeline::{LoweredUnit, lower_program, lower_units};
pub use prelude::{Prelude, declare_prelude};
pub use registry::{MappingRegistry, TwinFactory};
pub use report::{LoweringEvent, LoweringReport, PassStats};
pub use stubs::{COMPLETION_PARAM, SUSPENDER_PARAM};
