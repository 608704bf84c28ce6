//! Diagnostics for the coroutine lowering pipeline.
//!
//! Lowering failures are internal-consistency errors, never user-facing type
//! errors: they mean an earlier pass, or the builtin library, did not hold up
//! its end of the contract. They are still reported as structured diagnostics
//! so the driver can attribute them to a compilation unit and keep going with
//! the next one.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// What kind of failure a diagnostic reports. Each category owns a stable
/// `L` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A structural precondition of a lowering pass did not hold.
    InternalInvariant,
    /// A well-known builtin symbol is absent from the program.
    MissingBuiltin,
    /// A suspendable callee has no registered stub.
    MissingStub,
    /// The suspend intrinsic was used outside a stub body.
    MalformedSuspendIntrinsic,
    /// The post-lowering verifier rejected the program.
    Verification,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::InternalInvariant,
        Category::MissingBuiltin,
        Category::MissingStub,
        Category::MalformedSuspendIntrinsic,
        Category::Verification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::InternalInvariant => "internal_invariant",
            Category::MissingBuiltin => "missing_builtin",
            Category::MissingStub => "missing_stub",
            Category::MalformedSuspendIntrinsic => "malformed_suspend_intrinsic",
            Category::Verification => "verification",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::InternalInvariant => "L0001",
            Category::MissingBuiltin => "L0002",
            Category::MissingStub => "L0003",
            Category::MalformedSuspendIntrinsic => "L0004",
            Category::Verification => "L0005",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Category::InternalInvariant => "check the passes that ran before this one",
            Category::MissingBuiltin => "link the coroutine runtime library into the unit",
            Category::MissingStub => "run stub synthesis over every declaration before rewriting calls",
            Category::MalformedSuspendIntrinsic => {
                "call the intrinsic from a suspend function or inline it into one"
            }
            Category::Verification => "inspect the rendered program around the reported function",
        }
    }
}

/// One failure, attributed to a compilation unit once the driver knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    pub unit: Option<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            unit: None,
            help: None,
        }
    }

    pub fn code(&self) -> &'static str {
        self.category.code()
    }

    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity.as_str(), self.code(), self.message)?;
        if let Some(unit) = &self.unit {
            write!(f, "\n  --> unit `{unit}`")?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

/// One or more diagnostics; displays the first.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

impl From<Diagnostic> for DiagnosticError {
    fn from(diag: Diagnostic) -> Self {
        Self::single(diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_unit_and_help() {
        let diag = Diagnostic::error(Category::MissingStub, "no stub for `app.fetch`")
            .in_unit("app")
            .with_help(Category::MissingStub.hint());
        assert_eq!(
            diag.to_string(),
            "error[L0003]: no stub for `app.fetch`\n  --> unit `app`\n  help: run stub synthesis over every declaration before rewriting calls"
        );
    }

    #[test]
    fn warnings_share_the_category_code() {
        let diag = Diagnostic::warning(Category::MalformedSuspendIntrinsic, "left as is");
        assert_eq!(diag.to_string(), "warning[L0004]: left as is");
    }

    #[test]
    fn error_displays_first_diagnostic() {
        let err = DiagnosticError(vec![
            Diagnostic::error(Category::Verification, "first"),
            Diagnostic::error(Category::InternalInvariant, "second"),
        ]);
        assert_eq!(err.to_string(), "error[L0005]: first");
        assert_eq!(err.diagnostics().len(), 2);
    }

    #[test]
    fn codes_are_unique() {
        let codes: std::collections::BTreeSet<_> = Category::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), Category::ALL.len());
        let names: std::collections::BTreeSet<_> = Category::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), Category::ALL.len());
    }
}
