//! Suspend-intrinsic expansion.
//!
//! Inside a stub, `suspendCoroutineUninterceptedOrReturn(block)` becomes
//!
//! ```text
//! composite {
//!     var suspendResult: Any? = block.invoke($completion)
//!     if (identityEquals(suspendResult, COROUTINE_SUSPENDED()))
//!         suspendCoroutine($completion, $suspender)
//!     else
//!         return@stub suspendResult
//! }
//! ```

use coro_ir::{Call, ExprId, ExprKind, FunctionId, IrBuilder, Program, StatementOrigin, VarOrigin};
use coro_types::Type;

use crate::body::{BodyContext, BodyLowering, StubFrame};
use crate::builtins::Builtins;
use crate::config::{BodyPass, IntrinsicPolicy};
use crate::error::LowerError;
use crate::registry::MappingRegistry;
use crate::report::LoweringEvent;

pub const SUSPEND_RESULT_VAR: &str = "suspendResult";

#[derive(Debug, Default)]
pub struct SuspendIntrinsicExpansion;

impl BodyLowering for SuspendIntrinsicExpansion {
    fn pass(&self) -> BodyPass {
        BodyPass::SuspendIntrinsic
    }

    fn lower_body(
        &mut self,
        cx: &mut BodyContext<'_>,
        function: FunctionId,
        frame: Option<StubFrame>,
    ) -> Result<(), LowerError> {
        let Some(frame) = frame else {
            return check_outside_stub(cx, function);
        };
        let builtins = cx.builtins;
        let registry = cx.registry;
        let report = &mut *cx.report;
        cx.program.rewrite_body::<LowerError>(function, &mut |program, id| {
            let Some(call) = program.as_call(id) else {
                return Ok(None);
            };
            if !is_suspend_intrinsic(builtins, registry, call.callee) {
                return Ok(None);
            }
            let call = call.clone();
            let replacement = expand(program, builtins, frame, id, call)?;
            let label = program.function_label(function);
            tracing::debug!(target: "coro_lower", function = %label, "expanded suspend intrinsic");
            report.record(LoweringEvent::IntrinsicExpanded { function: label });
            Ok(Some(replacement))
        })
    }
}

/// The intrinsic itself, or its twin when call sites were rewritten first.
fn is_suspend_intrinsic(builtins: &Builtins, registry: &MappingRegistry, callee: FunctionId) -> bool {
    callee == builtins.suspend_intrinsic
        || registry.original_of(callee) == Some(builtins.suspend_intrinsic)
}

fn check_outside_stub(cx: &mut BodyContext<'_>, function: FunctionId) -> Result<(), LowerError> {
    let program = &*cx.program;
    let found = program
        .body_exprs(function)
        .into_iter()
        .filter(|e| {
            program
                .as_call(*e)
                .is_some_and(|c| is_suspend_intrinsic(cx.builtins, cx.registry, c.callee))
        })
        .count();
    if found == 0 {
        return Ok(());
    }
    let label = program.function_label(function);
    match cx.config.intrinsic_outside_stub {
        IntrinsicPolicy::Reject => Err(LowerError::IntrinsicOutsideStub { function: label }),
        IntrinsicPolicy::PassThrough => {
            tracing::warn!(
                target: "coro_lower",
                function = %label,
                calls = found,
                "suspend intrinsic used outside a suspend function; leaving it in place"
            );
            for _ in 0..found {
                cx.report.record(LoweringEvent::IntrinsicPassedThrough {
                    function: label.clone(),
                });
            }
            Ok(())
        }
    }
}

fn expand(
    program: &mut Program,
    builtins: &Builtins,
    frame: StubFrame,
    intrinsic: ExprId,
    call: Call,
) -> Result<ExprId, LowerError> {
    let (ty, span) = (program.expr(intrinsic).ty.clone(), program.expr(intrinsic).span);
    let block = call.arg(0).ok_or_else(|| LowerError::MissingArgument {
        function: program.function_label(frame.stub),
        call: program.function(call.callee).name.clone(),
    })?;
    let block_ty = &program.expr(block).ty;
    let block_class = block_ty.class_id().ok_or_else(|| LowerError::NotAClassType {
        function: program.function_label(frame.stub),
        what: "suspend block",
        ty: block_ty.to_string(),
    })?;
    let invoke = program
        .find_method(block_class, &builtins.names.invoke)
        .ok_or_else(|| LowerError::MissingMethod {
            class: program.class_fq_name(block_class),
            method: builtins.names.invoke.clone(),
        })?;

    let origin = Some(StatementOrigin::LoweredSuspendIntrinsic);
    let mut b = IrBuilder::new(program, span);

    let completion = b.get_param(frame.completion);
    let invoke_call = Call {
        callee: invoke,
        dispatch_receiver: Some(block),
        super_qualifier: None,
        args: vec![Some(completion)],
        type_args: call.type_args,
        origin,
    };
    let invoke_call = b.call(invoke_call, Type::NullableAny);
    let (result, decl) = b.var_with_origin(
        SUSPEND_RESULT_VAR,
        Type::NullableAny,
        Some(invoke_call),
        VarOrigin::SuspendResult,
    );

    let lhs = b.get_var(result);
    let marker = b.call(Call::new(builtins.suspended_marker, vec![]), Type::Any);
    let mut equals = Call::new(builtins.identity_equals, vec![lhs, marker]);
    equals.origin = origin;
    let condition = b.call(equals, Type::Bool);

    let completion = b.get_param(frame.completion);
    let suspender = b.get_param(frame.suspender);
    let suspend = b.call(
        Call::new(builtins.suspend_primitive, vec![completion, suspender]),
        Type::NullableAny,
    );
    let value = b.get_var(result);
    let early_return = b.ret(frame.stub, value);
    let branch = b.expr(
        ExprKind::If {
            condition,
            then_branch: suspend,
            else_branch: Some(early_return),
            origin,
        },
        ty.clone(),
    );
    Ok(b.composite(vec![decl, branch], ty, origin))
}
