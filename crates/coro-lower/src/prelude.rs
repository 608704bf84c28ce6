//! Declarations of the coroutine runtime library.
//!
//! Real compilation units link the runtime library in from elsewhere; this
//! module declares the same surface directly into a [`Program`] under the
//! configured names, which is what tests, benchmarks and the evaluator use.
//! Every declaration is bodiless and marked [`DeclOrigin::Intrinsic`]: the
//! target supplies the behaviour.

use std::collections::BTreeMap;

use coro_ir::{ClassKind, DeclOrigin, FileId, FunctionId, FunctionKind, Parent, Program, TypeParamOwner};
use coro_types::{ClassId, Type};

use crate::config::BuiltinNames;

/// Handles to everything [`declare_prelude`] created.
#[derive(Debug, Clone)]
pub struct Prelude {
    pub continuation: ClassId,
    pub continuation_resume_with: FunctionId,
    pub result: ClassId,
    pub result_companion: ClassId,
    pub result_success: FunctionId,
    pub result_failure: FunctionId,
    pub suspender: ClassId,
    pub coroutine: ClassId,
    pub coroutine_constructor: FunctionId,
    pub coroutine_resume_with: FunctionId,
    /// `Function0` .. `Function3`: callable types whose last type argument is
    /// the result.
    pub functions: [ClassId; 4],
    pub suspend_intrinsic: FunctionId,
    pub suspend_primitive: FunctionId,
    pub resume_primitive: FunctionId,
    pub suspended_marker: FunctionId,
    pub identity_equals: FunctionId,
    pub ref_cast: FunctionId,
    /// Export functions indexed by arity.
    pub exports: [FunctionId; 3],
}

impl Prelude {
    /// `FunctionN<args.., result>`.
    pub fn function_type(&self, mut args: Vec<Type>, result: Type) -> Type {
        let class = self.functions[args.len()];
        args.push(result);
        Type::class(class, args)
    }

    /// Type of a suspend callback taking `args` and a completion for `result`.
    pub fn suspend_function_type(&self, mut args: Vec<Type>, result: Type) -> Type {
        args.push(Type::class(self.continuation, vec![result]));
        self.function_type(args, Type::NullableAny)
    }
}

/// Declare the runtime library into `program`, one file per package.
pub fn declare_prelude(program: &mut Program, names: &BuiltinNames) -> Prelude {
    let mut files = PackageFiles::default();

    // Classes first so member signatures can refer to any of them.
    let continuation = files.class(program, &names.continuation_class, ClassKind::Interface);
    let cont_t = program.add_type_param(TypeParamOwner::Class(continuation), "T");

    let result = files.class(program, &names.result_class, ClassKind::Class);
    program.add_type_param(TypeParamOwner::Class(result), "T");
    let result_companion = program.add_class("Companion", ClassKind::Object, Parent::Class(result));
    program.class_mut(result).companion = Some(result_companion);

    let suspender = files.class(program, &names.suspender_class, ClassKind::Class);

    let coroutine = files.class(program, &names.coroutine_class, ClassKind::Class);
    let coroutine_t = program.add_type_param(TypeParamOwner::Class(coroutine), "T");
    program.class_mut(coroutine).supertypes =
        vec![Type::class(continuation, vec![Type::Param(coroutine_t)])];

    let (callable_package, _) = split_fq(&names.continuation_class);
    let mut functions = Vec::with_capacity(4);
    for arity in 0..4 {
        let file = files.file(program, callable_package);
        let class = program.add_class(
            format!("Function{arity}"),
            ClassKind::Interface,
            Parent::File(file),
        );
        let params: Vec<Type> = (1..=arity)
            .map(|i| Type::Param(program.add_type_param(TypeParamOwner::Class(class), format!("P{i}"))))
            .collect();
        let ret = Type::Param(program.add_type_param(TypeParamOwner::Class(class), "R"));
        declare(program, &names.invoke, Parent::Class(class), |program, f| {
            for (i, ty) in params.iter().enumerate() {
                program.add_param(f, format!("p{}", i + 1), ty.clone());
            }
            ret
        });
        functions.push(class);
    }
    let functions: [ClassId; 4] = [functions[0], functions[1], functions[2], functions[3]];

    // Members.
    let continuation_resume_with =
        declare(program, &names.resume_with, Parent::Class(continuation), |program, f| {
            program.add_param(f, "result", Type::class(result, vec![Type::Param(cont_t)]));
            Type::Unit
        });

    let result_success = declare(
        program,
        &names.result_success,
        Parent::Class(result_companion),
        |program, f| {
            let t = Type::Param(program.add_type_param(TypeParamOwner::Function(f), "T"));
            program.add_param(f, "value", t.clone());
            Type::class(result, vec![t])
        },
    );
    let result_failure = declare(
        program,
        &names.result_failure,
        Parent::Class(result_companion),
        |program, f| {
            let t = Type::Param(program.add_type_param(TypeParamOwner::Function(f), "T"));
            program.add_param(f, "exception", Type::Throwable);
            Type::class(result, vec![t])
        },
    );

    let coroutine_constructor = declare_kind(
        program,
        "<init>",
        Parent::Class(coroutine),
        FunctionKind::Constructor,
        |program, f| {
            program.add_param(f, "suspender", Type::simple(suspender));
            Type::class(coroutine, vec![Type::Param(coroutine_t)])
        },
    );
    let coroutine_resume_with =
        declare(program, &names.resume_with, Parent::Class(coroutine), |program, f| {
            program.add_param(f, "result", Type::class(result, vec![Type::Param(coroutine_t)]));
            Type::Unit
        });
    program.function_mut(coroutine_resume_with).overridden = vec![continuation_resume_with];

    // Top-level intrinsics.
    let suspend_intrinsic = files.function(program, &names.suspend_intrinsic, |program, f| {
        let t = Type::Param(program.add_type_param(TypeParamOwner::Function(f), "T"));
        let block = Type::class(
            functions[1],
            vec![Type::class(continuation, vec![t.clone()]), Type::NullableAny],
        );
        program.add_param(f, "block", block);
        t
    });
    program.function_mut(suspend_intrinsic).is_suspend = true;

    let suspend_primitive = files.function(program, &names.suspend_primitive, |program, f| {
        program.add_param(f, "completion", Type::class(continuation, vec![Type::NullableAny]));
        program.add_param(f, "suspender", Type::simple(suspender));
        Type::NullableAny
    });
    let resume_primitive = files.function(program, &names.resume_primitive, |program, f| {
        let t = Type::Param(program.add_type_param(TypeParamOwner::Function(f), "T"));
        program.add_param(f, "result", Type::class(result, vec![t.clone()]));
        program.add_param(f, "continuation", Type::class(continuation, vec![t]));
        program.add_param(f, "suspender", Type::simple(suspender));
        Type::Unit
    });
    let suspended_marker = files.function(program, &names.suspended_marker, |_, _| Type::Any);
    let identity_equals = files.function(program, &names.identity_equals, |program, f| {
        program.add_param(f, "a", Type::NullableAny);
        program.add_param(f, "b", Type::NullableAny);
        Type::Bool
    });
    let ref_cast = files.function(program, &names.ref_cast, |program, f| {
        let t = Type::Param(program.add_type_param(TypeParamOwner::Function(f), "T"));
        program.add_param(f, "value", Type::NullableAny);
        t
    });

    // Export functions: `callExportedN<R.., T>(f, args..): T`, suspend.
    let mut exports = Vec::with_capacity(3);
    for (arity, name) in names.export_functions.iter().enumerate() {
        let export = files.function(program, name, |program, f| {
            let arg_names = ["R", "P"];
            let args: Vec<Type> = arg_names[..arity]
                .iter()
                .map(|n| Type::Param(program.add_type_param(TypeParamOwner::Function(f), *n)))
                .collect();
            let t = Type::Param(program.add_type_param(TypeParamOwner::Function(f), "T"));
            let mut callable_args = args.clone();
            callable_args.push(Type::class(continuation, vec![t.clone()]));
            let callable_class = functions[callable_args.len()];
            callable_args.push(Type::NullableAny);
            program.add_param(f, "f", Type::class(callable_class, callable_args));
            let param_names = ["receiver", "param"];
            for (ty, name) in args.into_iter().zip(param_names) {
                program.add_param(f, name, ty);
            }
            t
        });
        program.function_mut(export).is_suspend = true;
        exports.push(export);
    }

    Prelude {
        continuation,
        continuation_resume_with,
        result,
        result_companion,
        result_success,
        result_failure,
        suspender,
        coroutine,
        coroutine_constructor,
        coroutine_resume_with,
        functions,
        suspend_intrinsic,
        suspend_primitive,
        resume_primitive,
        suspended_marker,
        identity_equals,
        ref_cast,
        exports: [exports[0], exports[1], exports[2]],
    }
}

/// `a.b.C` -> (`a.b`, `C`).
fn split_fq(fq_name: &str) -> (&str, &str) {
    fq_name.rsplit_once('.').unwrap_or(("", fq_name))
}

fn declare(
    program: &mut Program,
    name: &str,
    parent: Parent,
    signature: impl FnOnce(&mut Program, FunctionId) -> Type,
) -> FunctionId {
    declare_kind(program, name, parent, FunctionKind::Simple, signature)
}

/// Declare an intrinsic function. `signature` adds type and value parameters
/// and returns the return type. Simple members get a dispatch receiver typed
/// with the owner's own type parameters.
fn declare_kind(
    program: &mut Program,
    name: &str,
    parent: Parent,
    kind: FunctionKind,
    signature: impl FnOnce(&mut Program, FunctionId) -> Type,
) -> FunctionId {
    let f = program.add_function(name, parent, Type::Unit);
    program.function_mut(f).origin = DeclOrigin::Intrinsic;
    program.function_mut(f).kind = kind;
    if let Parent::Class(class) = parent
        && kind == FunctionKind::Simple
    {
        let args = program
            .class(class)
            .type_params
            .iter()
            .map(|t| Type::Param(*t))
            .collect();
        program.add_dispatch_receiver(f, Type::class(class, args));
    }
    let ret = signature(program, f);
    program.function_mut(f).return_type = ret;
    f
}

#[derive(Default)]
struct PackageFiles {
    files: BTreeMap<String, FileId>,
}

impl PackageFiles {
    fn file(&mut self, program: &mut Program, package: &str) -> FileId {
        *self
            .files
            .entry(package.to_string())
            .or_insert_with(|| program.add_file(format!("{package}/runtime.kt"), package))
    }

    fn class(&mut self, program: &mut Program, fq_name: &str, kind: ClassKind) -> ClassId {
        let (package, name) = split_fq(fq_name);
        let file = self.file(program, package);
        program.add_class(name, kind, Parent::File(file))
    }

    fn function(
        &mut self,
        program: &mut Program,
        fq_name: &str,
        signature: impl FnOnce(&mut Program, FunctionId) -> Type,
    ) -> FunctionId {
        let (package, name) = split_fq(fq_name);
        let file = self.file(program, package);
        declare(program, name, Parent::File(file), signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_under_configured_names() {
        let mut program = Program::new("unit");
        let names = BuiltinNames::default();
        let prelude = declare_prelude(&mut program, &names);

        assert_eq!(program.find_class("coro.Continuation"), Some(prelude.continuation));
        assert_eq!(program.find_class("coro.Result.Companion"), Some(prelude.result_companion));
        assert_eq!(program.find_class("coro.Function3"), Some(prelude.functions[3]));
        assert_eq!(
            program.find_function("coro.internal.callExported1"),
            Some(prelude.exports[1])
        );
        assert_eq!(program.primary_constructor(prelude.coroutine), Some(prelude.coroutine_constructor));
        assert_eq!(
            program.find_method(prelude.coroutine, "resumeWith"),
            Some(prelude.coroutine_resume_with)
        );
    }

    #[test]
    fn export_signatures_follow_arity() {
        let mut program = Program::new("unit");
        let prelude = declare_prelude(&mut program, &BuiltinNames::default());
        for (arity, export) in prelude.exports.iter().enumerate() {
            let f = program.function(*export);
            assert!(f.is_suspend);
            assert_eq!(f.params.len(), arity + 1);
            assert_eq!(f.type_params.len(), arity + 1);
            assert_eq!(f.return_type, Type::Param(f.type_params[arity]));
            let callable = &program.param(f.params[0]).ty;
            assert_eq!(callable.class_id(), Some(prelude.functions[arity + 1]));
        }
    }

    #[test]
    fn suspend_function_type_appends_continuation() {
        let mut program = Program::new("unit");
        let prelude = declare_prelude(&mut program, &BuiltinNames::default());
        let ty = prelude.suspend_function_type(vec![Type::Int], Type::String);
        assert_eq!(
            ty,
            Type::class(
                prelude.functions[2],
                vec![
                    Type::Int,
                    Type::class(prelude.continuation, vec![Type::String]),
                    Type::NullableAny
                ]
            )
        );
    }
}
