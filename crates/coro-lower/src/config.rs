//! Lowering configuration.
//!
//! Everything is `serde`-(de)serialisable so a driver can keep the
//! configuration next to its other build settings. Missing fields take their
//! defaults.

use serde::{Deserialize, Serialize};

use crate::error::LowerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    pub builtins: BuiltinNames,
    pub intrinsic_outside_stub: IntrinsicPolicy,
    /// Order of the body rewrites that run after stub synthesis. Each pass
    /// must appear exactly once.
    pub body_pass_order: Vec<BodyPass>,
    pub generate_export_trampolines: bool,
    pub verify: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            builtins: BuiltinNames::default(),
            intrinsic_outside_stub: IntrinsicPolicy::PassThrough,
            body_pass_order: BodyPass::ALL.to_vec(),
            generate_export_trampolines: true,
            verify: true,
        }
    }
}

impl LoweringConfig {
    pub fn from_json(source: &str) -> Result<Self, LowerError> {
        let config: Self = serde_json::from_str(source).map_err(|err| LowerError::InvalidConfig {
            detail: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, LowerError> {
        serde_json::to_string_pretty(self).map_err(|err| LowerError::InvalidConfig {
            detail: err.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), LowerError> {
        for pass in BodyPass::ALL {
            let count = self.body_pass_order.iter().filter(|p| **p == pass).count();
            if count != 1 {
                return Err(LowerError::InvalidConfig {
                    detail: format!(
                        "body pass `{}` must appear exactly once in `body_pass_order`, found {count}",
                        pass.as_str()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// What to do with a suspend-intrinsic call found outside a stub body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicPolicy {
    /// Leave the call alone and log a warning.
    #[default]
    PassThrough,
    /// Fail the compilation unit.
    Reject,
}

/// The body rewrites that follow stub synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPass {
    CallSites,
    ResumeCalls,
    SuspendIntrinsic,
}

impl BodyPass {
    pub const ALL: [BodyPass; 3] = [
        BodyPass::CallSites,
        BodyPass::ResumeCalls,
        BodyPass::SuspendIntrinsic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BodyPass::CallSites => "call_sites",
            BodyPass::ResumeCalls => "resume_calls",
            BodyPass::SuspendIntrinsic => "suspend_intrinsic",
        }
    }
}

/// Fully-qualified names of the builtin symbols lowering relies on.
///
/// Member names (`resume_with`, `invoke`, `success`, `failure`) are simple
/// names looked up on their owning class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinNames {
    pub continuation_class: String,
    pub resume_with: String,
    pub result_class: String,
    pub result_success: String,
    pub result_failure: String,
    pub coroutine_class: String,
    pub suspender_class: String,
    pub invoke: String,
    pub suspend_intrinsic: String,
    pub suspend_primitive: String,
    pub resume_primitive: String,
    pub suspended_marker: String,
    pub identity_equals: String,
    pub ref_cast: String,
    /// Export functions, indexed by arity.
    pub export_functions: [String; 3],
}

impl Default for BuiltinNames {
    fn default() -> Self {
        Self {
            continuation_class: "coro.Continuation".to_string(),
            resume_with: "resumeWith".to_string(),
            result_class: "coro.Result".to_string(),
            result_success: "success".to_string(),
            result_failure: "failure".to_string(),
            coroutine_class: "coro.internal.Coroutine".to_string(),
            suspender_class: "coro.internal.Suspender".to_string(),
            invoke: "invoke".to_string(),
            suspend_intrinsic: "coro.intrinsics.suspendCoroutineUninterceptedOrReturn"
                .to_string(),
            suspend_primitive: "coro.internal.suspendCoroutine".to_string(),
            resume_primitive: "coro.internal.resumeCoroutine".to_string(),
            suspended_marker: "coro.intrinsics.COROUTINE_SUSPENDED".to_string(),
            identity_equals: "coro.internal.identityEquals".to_string(),
            ref_cast: "coro.internal.refCast".to_string(),
            export_functions: [
                "coro.internal.callExported0".to_string(),
                "coro.internal.callExported1".to_string(),
                "coro.internal.callExported2".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LoweringConfig::default();
        config.validate().unwrap();
        assert_eq!(config.intrinsic_outside_stub, IntrinsicPolicy::PassThrough);
        assert!(config.generate_export_trampolines);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = LoweringConfig::from_json(
            r#"{ "intrinsic_outside_stub": "reject",
                 "body_pass_order": ["suspend_intrinsic", "resume_calls", "call_sites"] }"#,
        )
        .unwrap();
        assert_eq!(config.intrinsic_outside_stub, IntrinsicPolicy::Reject);
        assert_eq!(config.body_pass_order[0], BodyPass::SuspendIntrinsic);
        assert_eq!(config.builtins, BuiltinNames::default());
    }

    #[test]
    fn duplicate_pass_is_rejected() {
        let err = LoweringConfig::from_json(r#"{ "body_pass_order": ["call_sites", "call_sites"] }"#)
            .unwrap_err();
        assert!(matches!(err, LowerError::InvalidConfig { .. }));
        assert!(err.to_string().contains("call_sites"));
    }

    #[test]
    fn json_round_trip_preserves_renamed_builtins() {
        let mut config = LoweringConfig::default();
        config.builtins.suspend_primitive = "rt.switchOut".to_string();
        let json = config.to_json().unwrap();
        assert_eq!(LoweringConfig::from_json(&json).unwrap(), config);
    }
}
