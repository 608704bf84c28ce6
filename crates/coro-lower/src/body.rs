//! Shared driver for the passes that rewrite function bodies after stub
//! synthesis.

use std::collections::{BTreeMap, BTreeSet};

use coro_ir::{FunctionId, ParamId, ParamOrigin, Parent, Program};

use crate::builtins::Builtins;
use crate::config::{BodyPass, LoweringConfig};
use crate::error::LowerError;
use crate::registry::MappingRegistry;
use crate::report::{LoweringEvent, LoweringReport};

/// Everything a body pass may read or write.
pub struct BodyContext<'a> {
    pub program: &'a mut Program,
    pub registry: &'a MappingRegistry,
    pub builtins: &'a Builtins,
    pub config: &'a LoweringConfig,
    pub report: &'a mut LoweringReport,
}

/// The stub whose body is being rewritten, with its trailing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubFrame {
    pub stub: FunctionId,
    pub completion: ParamId,
    pub suspender: ParamId,
}

impl StubFrame {
    /// `Some` when `function` is a registered twin. A twin without the two
    /// trailing parameters is an invariant violation.
    pub fn of(
        program: &Program,
        registry: &MappingRegistry,
        function: FunctionId,
    ) -> Result<Option<Self>, LowerError> {
        if !registry.is_twin(function) {
            return Ok(None);
        }
        let params = &program.function(function).params;
        let malformed = || LowerError::MalformedStub {
            function: program.function_label(function),
            params: params.len(),
        };
        let [.., completion, suspender] = params.as_slice() else {
            return Err(malformed());
        };
        if program.param(*completion).origin != ParamOrigin::Completion
            || program.param(*suspender).origin != ParamOrigin::Suspender
        {
            return Err(malformed());
        }
        Ok(Some(Self {
            stub: function,
            completion: *completion,
            suspender: *suspender,
        }))
    }
}

/// A rewrite applied to one function body at a time.
pub trait BodyLowering {
    fn pass(&self) -> BodyPass;

    /// Rewrite the body of `function`. `frame` is `Some` for stub bodies.
    /// Bodies of nested functions are not part of `function`'s body; they
    /// are handed to this method separately.
    fn lower_body(
        &mut self,
        cx: &mut BodyContext<'_>,
        function: FunctionId,
        frame: Option<StubFrame>,
    ) -> Result<(), LowerError>;
}

/// Every function with a body that is live in the output: listed functions
/// plus, transitively, the local functions they own. Locals come before
/// their owner and each function appears once.
pub fn executable_functions(program: &Program) -> Vec<FunctionId> {
    let mut locals: BTreeMap<FunctionId, Vec<FunctionId>> = BTreeMap::new();
    for f in program.function_ids() {
        if let Parent::Function(owner) = program.function(f).parent {
            locals.entry(owner).or_default().push(f);
        }
    }

    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    for root in program.declared_functions() {
        push_postfix(root, &locals, &mut seen, &mut out);
    }
    out.retain(|f| program.function(*f).body.is_some());
    out
}

fn push_postfix(
    function: FunctionId,
    locals: &BTreeMap<FunctionId, Vec<FunctionId>>,
    seen: &mut BTreeSet<FunctionId>,
    out: &mut Vec<FunctionId>,
) {
    if !seen.insert(function) {
        return;
    }
    for local in locals.get(&function).into_iter().flatten() {
        push_postfix(*local, locals, seen, out);
    }
    out.push(function);
}

/// Run `lowering` over every executable body.
pub fn run_body_pass(
    cx: &mut BodyContext<'_>,
    lowering: &mut dyn BodyLowering,
) -> Result<(), LowerError> {
    let pass = lowering.pass();
    for function in executable_functions(cx.program) {
        let frame = StubFrame::of(cx.program, cx.registry, function)?;
        let label = cx.program.function_label(function);
        tracing::trace!(
            target: "coro_lower",
            pass = pass.as_str(),
            function = %label,
            stub = frame.is_some(),
            "visiting body"
        );
        cx.report.record(LoweringEvent::BodyVisited {
            pass,
            function: label,
            function_id: function.0,
        });
        lowering.lower_body(cx, function, frame)?;
    }
    Ok(())
}
