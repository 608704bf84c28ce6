//! Call-site rewriting: inside stub bodies, calls to suspend functions are
//! redirected to their twins with the caller's completion and suspender
//! appended.

use coro_ir::{FunctionId, IrBuilder};

use crate::body::{BodyContext, BodyLowering, StubFrame};
use crate::config::BodyPass;
use crate::error::LowerError;
use crate::report::LoweringEvent;

#[derive(Debug, Default)]
pub struct CallSiteRewrite;

impl BodyLowering for CallSiteRewrite {
    fn pass(&self) -> BodyPass {
        BodyPass::CallSites
    }

    fn lower_body(
        &mut self,
        cx: &mut BodyContext<'_>,
        function: FunctionId,
        frame: Option<StubFrame>,
    ) -> Result<(), LowerError> {
        let Some(frame) = frame else {
            return Ok(());
        };
        let registry = cx.registry;
        let report = &mut *cx.report;
        cx.program.rewrite_body::<LowerError>(function, &mut |program, id| {
            let Some(call) = program.as_call(id) else {
                return Ok(None);
            };
            let callee = call.callee;
            if !program.function(callee).is_suspend {
                return Ok(None);
            }
            let twin = registry
                .twin_of(callee)
                .ok_or_else(|| LowerError::MissingStub {
                    callee: program.function_label(callee),
                    caller: program.function_label(function),
                })?;

            let params = program.function(callee).params.len();
            if call.args.len() > params {
                return Err(LowerError::SurplusArguments {
                    caller: program.function_label(function),
                    callee: program.function_label(callee),
                    passed: call.args.len(),
                    params,
                });
            }
            let mut rebuilt = call.clone();
            rebuilt.callee = twin;
            // Omitted trailing arguments keep their defaults; pad so the
            // appended arguments land on the trailing parameters.
            rebuilt.args.resize(params, None);

            let expr = program.expr(id);
            let (ty, span) = (expr.ty.clone(), expr.span);
            let mut b = IrBuilder::new(program, span);
            let completion = b.get_param(frame.completion);
            let suspender = b.get_param(frame.suspender);
            rebuilt.args.push(Some(completion));
            rebuilt.args.push(Some(suspender));
            let replacement = b.call(rebuilt, ty);

            let caller = program.function_label(function);
            let callee = program.function_label(callee);
            tracing::debug!(
                target: "coro_lower",
                caller = %caller,
                callee = %callee,
                twin = twin.0,
                "rewrote suspend call"
            );
            report.record(LoweringEvent::CallRewritten { caller, callee });
            Ok(Some(replacement))
        })
    }
}
