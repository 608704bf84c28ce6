//! Resolution of the builtin symbols lowering depends on.

use coro_ir::{FunctionId, Parent, Program};
use coro_types::{ClassId, Type};

use crate::config::BuiltinNames;
use crate::error::LowerError;

/// Builtin classes and functions, resolved once per compilation unit.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub names: BuiltinNames,
    pub continuation: ClassId,
    pub continuation_resume_with: FunctionId,
    pub result: ClassId,
    pub result_companion: ClassId,
    pub result_success: FunctionId,
    pub result_failure: FunctionId,
    pub coroutine: ClassId,
    pub coroutine_constructor: FunctionId,
    pub suspender: ClassId,
    pub suspend_intrinsic: FunctionId,
    pub suspend_primitive: FunctionId,
    pub resume_primitive: FunctionId,
    pub suspended_marker: FunctionId,
    pub identity_equals: FunctionId,
    pub ref_cast: FunctionId,
}

impl Builtins {
    /// Look up every builtin in `program`. Any absent symbol is fatal.
    pub fn resolve(program: &Program, names: &BuiltinNames) -> Result<Self, LowerError> {
        let continuation = class(program, &names.continuation_class)?;
        let result = class(program, &names.result_class)?;
        let result_companion =
            program
                .class(result)
                .companion
                .ok_or_else(|| LowerError::MissingBuiltin {
                    name: format!("{}.Companion", names.result_class),
                })?;
        let coroutine = class(program, &names.coroutine_class)?;
        let coroutine_constructor =
            program
                .primary_constructor(coroutine)
                .ok_or_else(|| LowerError::MissingBuiltin {
                    name: format!("{}.<init>", names.coroutine_class),
                })?;

        let builtins = Self {
            continuation,
            continuation_resume_with: method(program, continuation, &names.resume_with)?,
            result,
            result_companion,
            result_success: method(program, result_companion, &names.result_success)?,
            result_failure: method(program, result_companion, &names.result_failure)?,
            coroutine,
            coroutine_constructor,
            suspender: class(program, &names.suspender_class)?,
            suspend_intrinsic: function(program, &names.suspend_intrinsic)?,
            suspend_primitive: function(program, &names.suspend_primitive)?,
            resume_primitive: function(program, &names.resume_primitive)?,
            suspended_marker: function(program, &names.suspended_marker)?,
            identity_equals: function(program, &names.identity_equals)?,
            ref_cast: function(program, &names.ref_cast)?,
            names: names.clone(),
        };

        if !program.function(builtins.suspend_intrinsic).is_suspend {
            return Err(LowerError::MalformedBuiltin {
                name: names.suspend_intrinsic.clone(),
                detail: "the suspend intrinsic must itself be a suspend function".to_string(),
            });
        }
        if program.function(builtins.resume_primitive).params.len() != 3 {
            return Err(LowerError::MalformedBuiltin {
                name: names.resume_primitive.clone(),
                detail: "expected parameters (result, continuation, suspender)".to_string(),
            });
        }
        if program.function(builtins.suspend_primitive).params.len() != 2 {
            return Err(LowerError::MalformedBuiltin {
                name: names.suspend_primitive.clone(),
                detail: "expected parameters (completion, suspender)".to_string(),
            });
        }
        Ok(builtins)
    }

    /// `Continuation<result>`, the type of a stub's completion parameter.
    pub fn completion_type(&self, result: Type) -> Type {
        Type::class(self.continuation, vec![result])
    }

    pub fn suspender_type(&self) -> Type {
        Type::simple(self.suspender)
    }

    /// The continuation class itself, or a class that lists it among its
    /// direct supertypes.
    pub fn is_continuation_like(&self, program: &Program, class: ClassId) -> bool {
        class == self.continuation
            || program
                .class(class)
                .supertypes
                .iter()
                .any(|t| t.class_id() == Some(self.continuation))
    }

    /// Whether `function` is a `resumeWith` member of a continuation-like
    /// class.
    pub fn is_resume_member(&self, program: &Program, function: FunctionId) -> bool {
        let f = program.function(function);
        f.name == self.names.resume_with
            && matches!(f.parent, Parent::Class(owner) if self.is_continuation_like(program, owner))
    }
}

fn class(program: &Program, fq_name: &str) -> Result<ClassId, LowerError> {
    program
        .find_class(fq_name)
        .ok_or_else(|| LowerError::MissingBuiltin {
            name: fq_name.to_string(),
        })
}

fn function(program: &Program, fq_name: &str) -> Result<FunctionId, LowerError> {
    program
        .find_function(fq_name)
        .ok_or_else(|| LowerError::MissingBuiltin {
            name: fq_name.to_string(),
        })
}

fn method(program: &Program, class: ClassId, name: &str) -> Result<FunctionId, LowerError> {
    program
        .find_method(class, name)
        .ok_or_else(|| LowerError::MissingBuiltin {
            name: format!("{}.{name}", program.class_fq_name(class)),
        })
}
