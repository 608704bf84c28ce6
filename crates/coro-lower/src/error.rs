//! Lowering errors and their diagnostic form.

use coro_diag::{Category, Diagnostic};

/// A fatal lowering failure. Every variant aborts the compilation unit it was
/// raised in.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("builtin `{name}` is not declared in the program")]
    MissingBuiltin { name: String },
    #[error("builtin `{name}` has an unexpected shape: {detail}")]
    MalformedBuiltin { name: String, detail: String },
    #[error("no stub registered for suspend function `{callee}` called from `{caller}`")]
    MissingStub { callee: String, caller: String },
    #[error("registry conflict: function #{function} is already mapped to #{existing}")]
    RegistryConflict { function: u32, existing: u32 },
    #[error(
        "stub `{function}` has {params} parameter(s); expected trailing completion and suspender"
    )]
    MalformedStub { function: String, params: usize },
    #[error("`{function}` is not listed in the declarations of its file or class")]
    UnlistedDeclaration { function: String },
    #[error("call to `{callee}` in `{caller}` passes {passed} argument(s) for {params} parameter(s)")]
    SurplusArguments {
        caller: String,
        callee: String,
        passed: usize,
        params: usize,
    },
    #[error("`resumeWith` call in `{function}` has no dispatch receiver")]
    MissingResumeReceiver { function: String },
    #[error("`{call}` call in `{function}` is missing its first argument")]
    MissingArgument { function: String, call: String },
    #[error("`{class}` has no `{method}` method")]
    MissingMethod { class: String, method: String },
    #[error("expected a class type for {what} in `{function}`, found `{ty}`")]
    NotAClassType {
        function: String,
        what: &'static str,
        ty: String,
    },
    #[error("export function `{function}` has {actual} parameter(s); arity {arity} needs {expected}")]
    ExportShape {
        function: String,
        arity: usize,
        expected: usize,
        actual: usize,
    },
    #[error("suspend intrinsic called outside a suspend function in `{function}`")]
    IntrinsicOutsideStub { function: String },
    #[error("invalid lowering configuration: {detail}")]
    InvalidConfig { detail: String },
    #[error("verification failed in `{function}`: {detail}")]
    Verification { function: String, detail: String },
}

/// Coarse classification of a [`LowerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LowerErrorKind {
    /// A symbol, mapping entry or structural precondition is missing.
    InternalLoweringInvariantViolation,
    /// A well-known builtin could not be resolved. Also an invariant
    /// violation, kept apart so drivers can point at the runtime library.
    MissingBuiltin,
    /// The input program or configuration is not something lowering accepts.
    MalformedInput,
}

impl LowerError {
    pub fn kind(&self) -> LowerErrorKind {
        match self {
            LowerError::MissingBuiltin { .. } | LowerError::MalformedBuiltin { .. } => {
                LowerErrorKind::MissingBuiltin
            }
            LowerError::IntrinsicOutsideStub { .. } | LowerError::InvalidConfig { .. } => {
                LowerErrorKind::MalformedInput
            }
            LowerError::MissingStub { .. }
            | LowerError::RegistryConflict { .. }
            | LowerError::MalformedStub { .. }
            | LowerError::UnlistedDeclaration { .. }
            | LowerError::SurplusArguments { .. }
            | LowerError::MissingResumeReceiver { .. }
            | LowerError::MissingArgument { .. }
            | LowerError::MissingMethod { .. }
            | LowerError::NotAClassType { .. }
            | LowerError::ExportShape { .. }
            | LowerError::Verification { .. } => LowerErrorKind::InternalLoweringInvariantViolation,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            LowerError::MissingBuiltin { .. } | LowerError::MalformedBuiltin { .. } => {
                Category::MissingBuiltin
            }
            LowerError::MissingStub { .. } => Category::MissingStub,
            LowerError::IntrinsicOutsideStub { .. } => Category::MalformedSuspendIntrinsic,
            LowerError::Verification { .. } => Category::Verification,
            _ => Category::InternalInvariant,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let category = self.category();
        Diagnostic::error(category, self.to_string()).with_help(category.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_builtin_maps_to_l0002() {
        let err = LowerError::MissingBuiltin {
            name: "coro.Result".to_string(),
        };
        assert_eq!(err.kind(), LowerErrorKind::MissingBuiltin);
        let diag = err.to_diagnostic();
        assert_eq!(diag.code(), "L0002");
        assert!(diag.message.contains("coro.Result"));
        assert!(diag.help.is_some());
    }

    #[test]
    fn missing_stub_is_an_invariant_violation() {
        let err = LowerError::MissingStub {
            callee: "app.fetch".to_string(),
            caller: "app.main".to_string(),
        };
        assert_eq!(err.kind(), LowerErrorKind::InternalLoweringInvariantViolation);
        assert_eq!(
            err.to_string(),
            "no stub registered for suspend function `app.fetch` called from `app.main`"
        );
        assert_eq!(err.to_diagnostic().code(), "L0003");
    }

    #[test]
    fn intrinsic_outside_stub_is_malformed_input() {
        let err = LowerError::IntrinsicOutsideStub {
            function: "app.plain".to_string(),
        };
        assert_eq!(err.kind(), LowerErrorKind::MalformedInput);
        assert_eq!(err.to_diagnostic().category, Category::MalformedSuspendIntrinsic);
    }
}
