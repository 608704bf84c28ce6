//! Resume-call rewriting: `continuation.resumeWith(result)` inside a stub
//! becomes `resumePrimitive(result, continuation, suspender)`.

use coro_ir::{Call, FunctionId, IrBuilder};

use crate::body::{BodyContext, BodyLowering, StubFrame};
use crate::config::BodyPass;
use crate::error::LowerError;
use crate::report::LoweringEvent;

#[derive(Debug, Default)]
pub struct ResumeCallRewrite;

impl BodyLowering for ResumeCallRewrite {
    fn pass(&self) -> BodyPass {
        BodyPass::ResumeCalls
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
        let builtins = cx.builtins;
        let report = &mut *cx.report;
        cx.program.rewrite_body::<LowerError>(function, &mut |program, id| {
            let Some(call) = program.as_call(id) else {
                return Ok(None);
            };
            if program.function(call.callee).name != builtins.names.resume_with {
                return Ok(None);
            }
            let receiver = match call.dispatch_receiver {
                Some(receiver) => {
                    let class = program.expr(receiver).ty.class_id();
                    if !class.is_some_and(|c| builtins.is_continuation_like(program, c)) {
                        return Ok(None);
                    }
                    receiver
                }
                None if builtins.is_resume_member(program, call.callee) => {
                    return Err(LowerError::MissingResumeReceiver {
                        function: program.function_label(function),
                    });
                }
                None => return Ok(None),
            };
            let result = call.arg(0).ok_or_else(|| LowerError::MissingArgument {
                function: program.function_label(function),
                call: builtins.names.resume_with.clone(),
            })?;
            let type_args = call.type_args.clone();

            let expr = program.expr(id);
            let (ty, span) = (expr.ty.clone(), expr.span);
            let mut b = IrBuilder::new(program, span);
            let suspender = b.get_param(frame.suspender);
            let mut primitive = Call::new(builtins.resume_primitive, vec![result, receiver, suspender]);
            primitive.type_args = type_args;
            let replacement = b.call(primitive, ty);

            let label = program.function_label(function);
            tracing::debug!(target: "coro_lower", function = %label, "rewrote resume call");
            report.record(LoweringEvent::ResumeRewritten { function: label });
            Ok(Some(replacement))
        })
    }
}

#[cfg(test)]
mod tests {
    use coro_ir::{Body, ClassKind, Parent, Program, Span};
    use coro_types::Type;

    use super::*;
    use crate::body::run_body_pass;
    use crate::builtins::Builtins;
    use crate::config::{BuiltinNames, LoweringConfig};
    use crate::prelude::{Prelude, declare_prelude};
    use crate::registry::MappingRegistry;
    use crate::report::LoweringReport;
    use crate::stubs::synthesize_stubs;

    struct Unit {
        program: Program,
        registry: MappingRegistry,
        builtins: Builtins,
        report: LoweringReport,
    }

    fn stubbed(build: impl FnOnce(&mut Program, &Prelude)) -> Unit {
        let mut program = Program::new("unit");
        let prelude = declare_prelude(&mut program, &BuiltinNames::default());
        build(&mut program, &prelude);
        let builtins = Builtins::resolve(&program, &BuiltinNames::default()).unwrap();
        let mut registry = MappingRegistry::new();
        let mut report = LoweringReport::new("unit");
        synthesize_stubs(&mut program, &mut registry, &builtins, &mut report).unwrap();
        Unit {
            program,
            registry,
            builtins,
            report,
        }
    }

    fn rewrite(unit: &mut Unit) -> Result<(), LowerError> {
        let config = LoweringConfig::default();
        let mut cx = BodyContext {
            program: &mut unit.program,
            registry: &unit.registry,
            builtins: &unit.builtins,
            config: &config,
            report: &mut unit.report,
        };
        run_body_pass(&mut cx, &mut ResumeCallRewrite)
    }

    /// `suspend fun deliver(k: <receiver>, v: Int) { k.resumeWith(Result.success(v)) }`
    fn deliver(
        program: &mut Program,
        prelude: &Prelude,
        receiver_ty: Type,
        method: FunctionId,
    ) -> FunctionId {
        let file = program.add_file("app.kt", "app");
        let f = program.add_function("deliver", Parent::File(file), Type::Unit);
        program.function_mut(f).is_suspend = true;
        let k = program.add_param(f, "k", receiver_ty);
        let v = program.add_param(f, "v", Type::Int);
        let mut b = IrBuilder::new(program, Span::synthetic());
        let value = b.get_param(v);
        let companion = b.get_object(prelude.result_companion);
        let outcome = b.member_call(
            prelude.result_success,
            companion,
            vec![value],
            Type::class(prelude.result, vec![Type::Int]),
        );
        let receiver = b.get_param(k);
        let resume = b.member_call(method, receiver, vec![outcome], Type::Unit);
        program.function_mut(f).body = Some(Body::Block(vec![resume]));
        f
    }

    fn callees(unit: &Unit, function: FunctionId) -> Vec<FunctionId> {
        unit.program
            .body_exprs(function)
            .into_iter()
            .filter_map(|e| unit.program.as_call(e).map(|c| c.callee))
            .collect()
    }

    #[test]
    fn continuation_receiver_is_rewritten() {
        let mut original = None;
        let mut unit = stubbed(|program, prelude| {
            let ty = Type::class(prelude.continuation, vec![Type::Int]);
            original = Some(deliver(program, prelude, ty, prelude.continuation_resume_with));
        });
        rewrite(&mut unit).unwrap();

        let stub = unit.registry.twin_of(original.unwrap()).unwrap();
        let params = unit.program.function(stub).params.clone();
        let root = unit.program.body_exprs(stub)[0];
        let call = unit.program.as_call(root).unwrap();
        assert_eq!(call.callee, unit.builtins.resume_primitive);
        assert_eq!(call.args.len(), 3);
        assert_eq!(
            unit.program.expr(call.arg(1).unwrap()).kind,
            coro_ir::ExprKind::Get(coro_ir::ValueRef::Param(params[0]))
        );
        assert_eq!(
            unit.program.expr(call.arg(2).unwrap()).kind,
            coro_ir::ExprKind::Get(coro_ir::ValueRef::Param(params[3]))
        );
        assert_eq!(unit.report.stats.resumes_rewritten, 1);
    }

    #[test]
    fn direct_subclass_receiver_is_rewritten() {
        let mut original = None;
        let mut unit = stubbed(|program, prelude| {
            let ty = Type::class(prelude.coroutine, vec![Type::Int]);
            original = Some(deliver(program, prelude, ty, prelude.coroutine_resume_with));
        });
        rewrite(&mut unit).unwrap();
        let stub = unit.registry.twin_of(original.unwrap()).unwrap();
        assert!(callees(&unit, stub).contains(&unit.builtins.resume_primitive));
    }

    #[test]
    fn unrelated_resume_with_is_left_alone() {
        let mut ids = None;
        let mut unit = stubbed(|program, prelude| {
            let file = program.add_file("other.kt", "other");
            let mailbox = program.add_class("Mailbox", ClassKind::Class, Parent::File(file));
            let method = program.add_function("resumeWith", Parent::Class(mailbox), Type::Unit);
            program.add_dispatch_receiver(method, Type::simple(mailbox));
            program.add_param(method, "result", Type::NullableAny);
            ids = Some((deliver(program, prelude, Type::simple(mailbox), method), method));
        });
        rewrite(&mut unit).unwrap();
        let (original, method) = ids.unwrap();
        let stub = unit.registry.twin_of(original).unwrap();
        assert!(callees(&unit, stub).contains(&method));
        assert_eq!(unit.report.stats.resumes_rewritten, 0);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut original = None;
        let mut unit = stubbed(|program, prelude| {
            let ty = Type::class(prelude.continuation, vec![Type::Int]);
            original = Some(deliver(program, prelude, ty, prelude.continuation_resume_with));
        });
        rewrite(&mut unit).unwrap();
        let stub = unit.registry.twin_of(original.unwrap()).unwrap();
        let first = coro_ir::render_function(&unit.program, stub);
        rewrite(&mut unit).unwrap();
        assert_eq!(coro_ir::render_function(&unit.program, stub), first);
        assert_eq!(unit.report.stats.resumes_rewritten, 1);
    }

    #[test]
    fn missing_receiver_is_fatal() {
        let mut unit = stubbed(|program, prelude| {
            let file = program.add_file("app.kt", "app");
            let f = program.add_function("broken", Parent::File(file), Type::Unit);
            program.function_mut(f).is_suspend = true;
            let mut b = IrBuilder::new(program, Span::synthetic());
            let arg = b.null();
            let call = b.call(Call::new(prelude.continuation_resume_with, vec![arg]), Type::Unit);
            program.function_mut(f).body = Some(Body::Expression(call));
        });
        assert_eq!(
            rewrite(&mut unit),
            Err(LowerError::MissingResumeReceiver {
                function: "app.broken".to_string()
            })
        );
    }
}
