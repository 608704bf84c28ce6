//! Export trampolines: boundary functions the host calls to start a suspend
//! callable on a fresh stack.
//!
//! For arity `N` the export stub `callExportedN(f, a1..aN, $completion,
//! $suspender)` receives the expression body
//!
//! ```text
//! refCast<Continuation<T>>($completion).resumeWith(
//!     try { Result.success<T>(refCast(f).invoke(refCast(a1).., Coroutine<T>($suspender))) }
//!     catch (t: Throwable) { Result.failure<T>(t) })
//! ```
//!
//! and its parameters are retyped for the host calling convention.

use coro_ir::{Body, Call, ExprId, FunctionId, IrBuilder, ParamId, Program};
use coro_types::Type;

use crate::builtins::Builtins;
use crate::error::LowerError;
use crate::report::{LoweringEvent, LoweringReport};

/// Generates the export trampolines of one compilation unit.
pub struct ExportTrampolines<'a> {
    builtins: &'a Builtins,
}

impl<'a> ExportTrampolines<'a> {
    pub fn new(builtins: &'a Builtins) -> Self {
        Self { builtins }
    }

    /// Give every export function its trampoline body. Returns the
    /// trampolines in arity order.
    pub fn run(
        &self,
        program: &mut Program,
        report: &mut LoweringReport,
    ) -> Result<Vec<FunctionId>, LowerError> {
        let mut generated = Vec::with_capacity(3);
        for (arity, name) in self.builtins.names.export_functions.iter().enumerate() {
            let function = program
                .find_function(name)
                .ok_or_else(|| LowerError::MissingBuiltin { name: name.clone() })?;
            self.generate(program, function, arity)?;
            tracing::debug!(target: "coro_lower", function = %name, arity, "generated export trampoline");
            report.record(LoweringEvent::TrampolineGenerated {
                function: name.clone(),
                arity,
            });
            generated.push(function);
        }
        Ok(generated)
    }

    fn generate(&self, program: &mut Program, function: FunctionId, arity: usize) -> Result<(), LowerError> {
        let builtins = self.builtins;
        let label = program.function_label(function);
        let params = program.function(function).params.clone();
        let expected = arity + 3;
        if params.len() != expected {
            return Err(LowerError::ExportShape {
                function: label,
                arity,
                expected,
                actual: params.len(),
            });
        }
        let result_ty = program
            .function(function)
            .type_params
            .get(arity)
            .map(|t| Type::Param(*t))
            .ok_or_else(|| LowerError::MalformedBuiltin {
                name: label.clone(),
                detail: format!("expected {} type parameters", arity + 1),
            })?;

        let callable_ty = program.param(params[0]).ty.clone();
        let callable = callable_ty.class_id().ok_or_else(|| LowerError::NotAClassType {
            function: label.clone(),
            what: "exported callable",
            ty: callable_ty.to_string(),
        })?;
        let invoke = program
            .find_method(callable, &builtins.names.invoke)
            .ok_or_else(|| LowerError::MissingMethod {
                class: program.class_fq_name(callable),
                method: builtins.names.invoke.clone(),
            })?;

        // Host-facing types: opaque references, the suspender last. The typed
        // views are recovered with casts in the body.
        let typed: Vec<Type> = params.iter().map(|p| program.param(*p).ty.clone()).collect();
        let suspender = params[expected - 1];
        for p in &params[..expected - 1] {
            program.param_mut(*p).ty = Type::StructRef;
        }
        program.param_mut(suspender).ty = builtins.suspender_type();

        let span = program.function(function).span;
        let mut b = IrBuilder::new(program, span);
        let receiver = cast(&mut b, builtins, params[0], typed[0].clone());
        let mut args: Vec<ExprId> = (1..=arity)
            .map(|i| cast(&mut b, builtins, params[i], typed[i].clone()))
            .collect();
        let handle_arg = b.get_param(suspender);
        let mut handle = Call::new(builtins.coroutine_constructor, vec![handle_arg]);
        handle.type_args = vec![result_ty.clone()];
        args.push(b.call(handle, Type::class(builtins.coroutine, vec![result_ty.clone()])));
        let invoked = b.member_call(invoke, receiver, args, Type::NullableAny);

        let outcome_ty = Type::class(builtins.result, vec![result_ty.clone()]);
        let companion = b.get_object(builtins.result_companion);
        let success = outcome(&mut b, builtins.result_success, companion, invoked, &result_ty, &outcome_ty);
        let guarded = b.try_catch(
            success,
            "t",
            |b, t| {
                let thrown = b.get_var(t);
                let companion = b.get_object(builtins.result_companion);
                outcome(b, builtins.result_failure, companion, thrown, &result_ty, &outcome_ty)
            },
            outcome_ty.clone(),
        );
        let completion = cast(&mut b, builtins, params[arity + 1], typed[arity + 1].clone());
        let resume = b.member_call(builtins.continuation_resume_with, completion, vec![guarded], Type::Unit);
        program.function_mut(function).body = Some(Body::Expression(resume));
        Ok(())
    }
}

/// `refCast<to>(param)`.
fn cast(b: &mut IrBuilder<'_>, builtins: &Builtins, param: ParamId, to: Type) -> ExprId {
    let value = b.get_param(param);
    let mut call = Call::new(builtins.ref_cast, vec![value]);
    call.type_args = vec![to.clone()];
    b.call(call, to)
}

fn outcome(
    b: &mut IrBuilder<'_>,
    factory: FunctionId,
    companion: ExprId,
    value: ExprId,
    result_ty: &Type,
    outcome_ty: &Type,
) -> ExprId {
    let mut call = Call::new(factory, vec![value]);
    call.dispatch_receiver = Some(companion);
    call.type_args = vec![result_ty.clone()];
    b.call(call, outcome_ty.clone())
}
