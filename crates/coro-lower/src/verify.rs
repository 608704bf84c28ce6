//! Structural checks over a lowered program.

use coro_ir::{ExprKind, FunctionId, Parent, Program, ValueRef};

use crate::body::{StubFrame, executable_functions};
use crate::error::LowerError;
use crate::registry::MappingRegistry;

/// Check the lowered `program`. Every violation found is returned.
pub fn verify(program: &Program, registry: &MappingRegistry) -> Result<(), Vec<LowerError>> {
    let mut errors = Vec::new();
    let mut fail = |function: FunctionId, detail: String| {
        errors.push(LowerError::Verification {
            function: program.function_label(function),
            detail,
        });
    };

    for f in program.declared_functions() {
        if program.function(f).is_suspend {
            fail(f, "suspend function is still declared".to_string());
        }
    }

    for (_, twin) in registry.iter() {
        if let Err(err) = StubFrame::of(program, registry, twin) {
            fail(twin, err.to_string());
        }
    }

    for f in executable_functions(program) {
        let stub = registry.is_twin(f);
        for id in program.body_exprs(f) {
            match &program.expr(id).kind {
                ExprKind::Call(call) => {
                    let callee = program.function(call.callee);
                    if stub && callee.is_suspend {
                        fail(
                            f,
                            format!("calls suspend function `{}`", program.function_label(call.callee)),
                        );
                    }
                    if call.args.len() > callee.params.len() {
                        fail(
                            f,
                            format!(
                                "call to `{}` passes {} argument(s) for {} parameter(s)",
                                program.function_label(call.callee),
                                call.args.len(),
                                callee.params.len()
                            ),
                        );
                    }
                    // Omitted arguments fall back to the parameter's default.
                    for (index, param) in callee.params.iter().enumerate() {
                        let passed = call.args.get(index).is_some_and(Option::is_some);
                        if !passed && program.param(*param).default_value.is_none() {
                            fail(
                                f,
                                format!(
                                    "call to `{}` omits `{}`, which has no default",
                                    program.function_label(call.callee),
                                    program.param(*param).name
                                ),
                            );
                        }
                    }
                }
                ExprKind::Get(ValueRef::Param(p)) => {
                    let owner = program.param(*p).owner;
                    if !encloses(program, owner, f) {
                        fail(
                            f,
                            format!(
                                "refers to parameter `{}` of `{}`",
                                program.param(*p).name,
                                program.function_label(owner)
                            ),
                        );
                    }
                }
                ExprKind::Return { target, .. } => {
                    if !encloses(program, *target, f) {
                        fail(
                            f,
                            format!("returns to `{}`", program.function_label(*target)),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// `outer` is `inner` or one of the functions lexically enclosing it.
fn encloses(program: &Program, outer: FunctionId, inner: FunctionId) -> bool {
    let mut current = inner;
    loop {
        if current == outer {
            return true;
        }
        match program.function(current).parent {
            Parent::Function(parent) => current = parent,
            Parent::File(_) | Parent::Class(_) => return false,
        }
    }
}
