//! Synthetic programs for the lowering benchmarks and the report binary.

use coro_ir::{Body, Call, FileId, FunctionId, IrBuilder, Parent, Program, Span};
use coro_lower::{BuiltinNames, Prelude, declare_prelude};
use coro_types::Type;

/// Name of the bodiless callback the innermost function suspends on.
pub const PARK: &str = "bench.park";

pub struct Workload {
    pub program: Program,
    /// Entry point to start through an export trampoline.
    pub entry: FunctionId,
}

/// `depth` suspend functions where each calls the next and the last one
/// suspends on [`PARK`].
pub fn call_chain(depth: usize) -> Workload {
    let (mut program, prelude, file) = unit("chain");
    let leaf = parking_leaf(&mut program, &prelude, file);

    let mut callee = leaf;
    for i in 1..depth.max(1) {
        let f = suspend_fn(&mut program, file, &format!("link{i}"));
        let x = program.add_param(f, "x", Type::Int);
        let mut b = IrBuilder::new(&mut program, Span::synthetic());
        let arg = b.get_param(x);
        let call = b.call(Call::new(callee, vec![arg]), Type::Int);
        let ret = b.ret(f, call);
        program.function_mut(f).body = Some(Body::Block(vec![ret]));
        callee = f;
    }

    Workload {
        program,
        entry: callee,
    }
}

/// One root that calls `width` distinct suspend functions in sequence, each
/// of which resumes a continuation it was handed and then suspends.
pub fn fan_out(width: usize) -> Workload {
    let (mut program, prelude, file) = unit("fan");
    let leaf = parking_leaf(&mut program, &prelude, file);
    let int_continuation = Type::class(prelude.continuation, vec![Type::Int]);

    let mut branches = Vec::with_capacity(width);
    for i in 0..width {
        let f = suspend_fn(&mut program, file, &format!("branch{i}"));
        let k = program.add_param(f, "k", int_continuation.clone());
        let x = program.add_param(f, "x", Type::Int);
        let mut b = IrBuilder::new(&mut program, Span::synthetic());
        let value = b.get_param(x);
        let companion = b.get_object(prelude.result_companion);
        let mut success = Call::new(prelude.result_success, vec![value]);
        success.dispatch_receiver = Some(companion);
        success.type_args = vec![Type::Int];
        let outcome = b.call(success, Type::class(prelude.result, vec![Type::Int]));
        let receiver = b.get_param(k);
        let resume = b.member_call(prelude.continuation_resume_with, receiver, vec![outcome], Type::Unit);
        let arg = b.get_param(x);
        let call = b.call(Call::new(leaf, vec![arg]), Type::Int);
        let ret = b.ret(f, call);
        program.function_mut(f).body = Some(Body::Block(vec![resume, ret]));
        branches.push(f);
    }

    let root = suspend_fn(&mut program, file, "root");
    let k = program.add_param(root, "k", int_continuation);
    let mut b = IrBuilder::new(&mut program, Span::synthetic());
    let mut statements = Vec::with_capacity(width + 1);
    for branch in &branches {
        let k = b.get_param(k);
        let x = b.int(1);
        statements.push(b.call(Call::new(*branch, vec![k, x]), Type::Int));
    }
    let zero = b.int(0);
    statements.push(b.ret(root, zero));
    program.function_mut(root).body = Some(Body::Block(statements));

    Workload {
        program,
        entry: root,
    }
}

fn unit(name: &str) -> (Program, Prelude, FileId) {
    let mut program = Program::new(name);
    let prelude = declare_prelude(&mut program, &BuiltinNames::default());
    let file = program.add_file(format!("{name}.kt"), "bench");
    (program, prelude, file)
}

fn suspend_fn(program: &mut Program, file: FileId, name: &str) -> FunctionId {
    let f = program.add_function(name, Parent::File(file), Type::Int);
    program.function_mut(f).is_suspend = true;
    f
}

/// `suspend fun leaf(x: Int): Int = suspendCoroutineUninterceptedOrReturn<Int>(::park)`
fn parking_leaf(program: &mut Program, prelude: &Prelude, file: FileId) -> FunctionId {
    let park = program.add_function("park", Parent::File(file), Type::NullableAny);
    program.function_mut(park).modifiers.is_external = true;
    program.add_param(park, "c", Type::class(prelude.continuation, vec![Type::Int]));

    let leaf = suspend_fn(program, file, "leaf");
    program.add_param(leaf, "x", Type::Int);
    let mut b = IrBuilder::new(program, Span::synthetic());
    let block = b.function_ref(park, prelude.suspend_function_type(vec![], Type::Int));
    let mut intrinsic = Call::new(prelude.suspend_intrinsic, vec![block]);
    intrinsic.type_args = vec![Type::Int];
    let body = b.call(intrinsic, Type::Int);
    program.function_mut(leaf).body = Some(Body::Expression(body));
    leaf
}

#[cfg(test)]
mod tests {
    use coro_lower::{LoweringConfig, lower_program};

    use super::*;

    #[test]
    fn workloads_lower_cleanly() {
        for mut workload in [call_chain(8), fan_out(4)] {
            lower_program(&mut workload.program, &LoweringConfig::default()).unwrap();
        }
    }

    #[test]
    fn chain_has_requested_depth() {
        let workload = call_chain(5);
        let suspend = workload
            .program
            .declared_functions()
            .into_iter()
            .filter(|f| workload.program.function_fq_name(*f).is_some_and(|n| n.starts_with("bench.")))
            .filter(|f| workload.program.function(*f).is_suspend)
            .count();
        assert_eq!(suspend, 5);
        assert_eq!(workload.program.function_fq_name(workload.entry).as_deref(), Some("bench.link4"));
    }
}
