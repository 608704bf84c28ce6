use std::cell::RefCell;
use std::rc::Rc;

use coro_eval::{EvalError, Evaluator, Outcome, Value};
use coro_ir::{Body, Call, IrBuilder, Parent, Program, Span};
use coro_lower::{BuiltinNames, LoweringConfig, declare_prelude, lower_program};
use coro_types::Type;

/// ```text
/// external fun park(c: Continuation<Int>): Any?
/// suspend fun fetch(x: Int): Int = suspendCoroutineUninterceptedOrReturn<Int>(::park)
/// suspend fun main(x: Int): Int { return fetch(x) }
/// suspend fun fail(x: Int): Int { throw "boom" }
/// suspend fun deliver(k: Continuation<Int>, v: Int) { k.resumeWith(Result.success<Int>(v)) }
/// ```
fn evaluator() -> Evaluator {
    let mut program = Program::new("stacks");
    let prelude = declare_prelude(&mut program, &BuiltinNames::default());
    let file = program.add_file("app.kt", "app");
    let int_continuation = Type::class(prelude.continuation, vec![Type::Int]);

    let park = program.add_function("park", Parent::File(file), Type::NullableAny);
    program.function_mut(park).modifiers.is_external = true;
    program.add_param(park, "c", int_continuation.clone());

    let fetch = program.add_function("fetch", Parent::File(file), Type::Int);
    program.function_mut(fetch).is_suspend = true;
    program.add_param(fetch, "x", Type::Int);
    let block_ty = prelude.suspend_function_type(vec![], Type::Int);
    let mut b = IrBuilder::new(&mut program, Span::new(10, 20));
    let block = b.function_ref(park, block_ty);
    let mut intrinsic = Call::new(prelude.suspend_intrinsic, vec![block]);
    intrinsic.type_args = vec![Type::Int];
    let body = b.call(intrinsic, Type::Int);
    program.function_mut(fetch).body = Some(Body::Expression(body));

    let main = program.add_function("main", Parent::File(file), Type::Int);
    program.function_mut(main).is_suspend = true;
    let x = program.add_param(main, "x", Type::Int);
    let mut b = IrBuilder::new(&mut program, Span::synthetic());
    let arg = b.get_param(x);
    let call = b.call(Call::new(fetch, vec![arg]), Type::Int);
    let ret = b.ret(main, call);
    program.function_mut(main).body = Some(Body::Block(vec![ret]));

    let fail = program.add_function("fail", Parent::File(file), Type::Int);
    program.function_mut(fail).is_suspend = true;
    program.add_param(fail, "x", Type::Int);
    let mut b = IrBuilder::new(&mut program, Span::synthetic());
    let message = b.string("boom");
    let throw = b.throw(message);
    program.function_mut(fail).body = Some(Body::Block(vec![throw]));

    let deliver = program.add_function("deliver", Parent::File(file), Type::Unit);
    program.function_mut(deliver).is_suspend = true;
    let k = program.add_param(deliver, "k", int_continuation);
    let v = program.add_param(deliver, "v", Type::Int);
    let mut b = IrBuilder::new(&mut program, Span::synthetic());
    let value = b.get_param(v);
    let companion = b.get_object(prelude.result_companion);
    let mut success = Call::new(prelude.result_success, vec![value]);
    success.dispatch_receiver = Some(companion);
    success.type_args = vec![Type::Int];
    let outcome = b.call(success, Type::class(prelude.result, vec![Type::Int]));
    let receiver = b.get_param(k);
    let resume = b.member_call(prelude.continuation_resume_with, receiver, vec![outcome], Type::Unit);
    program.function_mut(deliver).body = Some(Body::Block(vec![resume]));

    let lowered = lower_program(&mut program, &LoweringConfig::default()).unwrap();
    Evaluator::new(program, lowered.builtins)
}

/// Bind `app.park` to record its continuation and answer with `answer`.
fn park_with(eval: &Evaluator, answer: Value) -> Rc<RefCell<Vec<Value>>> {
    let parked = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&parked);
    eval.bind_native("app.park", move |args| {
        sink.borrow_mut().push(args[0].clone());
        Ok(answer.clone())
    })
    .unwrap();
    parked
}

#[test]
fn suspended_export_completes_after_resume() {
    let eval = evaluator();
    let parked = park_with(&eval, Value::Suspended);
    let completion = eval.host_completion();

    eval.start_export(eval.function("app.main").unwrap(), vec![Value::Int(5)], completion.clone())
        .unwrap();
    assert_eq!(eval.outcome(&completion), None);
    assert_eq!(eval.suspended_stacks(), 1);

    let continuation = parked.borrow()[0].clone();
    assert!(matches!(continuation, Value::Coroutine(_)));
    eval.resume_with(&continuation, Outcome::Success(Value::Int(42))).unwrap();
    assert_eq!(eval.outcome(&completion), Some(Outcome::Success(Value::Int(42))));
    assert_eq!(eval.suspended_stacks(), 0);
}

#[test]
fn immediate_result_does_not_suspend() {
    let eval = evaluator();
    park_with(&eval, Value::Int(7));
    let completion = eval.host_completion();

    eval.start_export(eval.function("app.main").unwrap(), vec![Value::Int(1)], completion.clone())
        .unwrap();
    assert_eq!(eval.outcome(&completion), Some(Outcome::Success(Value::Int(7))));
    assert_eq!(eval.suspended_stacks(), 0);
}

#[test]
fn thrown_exception_becomes_failure() {
    let eval = evaluator();
    let completion = eval.host_completion();
    eval.start_export(eval.function("app.fail").unwrap(), vec![Value::Int(1)], completion.clone())
        .unwrap();
    assert_eq!(eval.outcome(&completion), Some(Outcome::Failure(Value::str("boom"))));
}

#[test]
fn failure_is_rethrown_at_the_suspension_point() {
    let eval = evaluator();
    let parked = park_with(&eval, Value::Suspended);
    let completion = eval.host_completion();
    eval.start_export(eval.function("app.main").unwrap(), vec![Value::Int(5)], completion.clone())
        .unwrap();

    let continuation = parked.borrow()[0].clone();
    eval.resume_with(&continuation, Outcome::Failure(Value::str("io")))
        .unwrap();
    assert_eq!(eval.outcome(&completion), Some(Outcome::Failure(Value::str("io"))));
}

#[test]
fn one_stack_resumes_another() {
    let eval = evaluator();
    let parked = park_with(&eval, Value::Suspended);
    let waiting = eval.host_completion();
    eval.start_export(eval.function("app.main").unwrap(), vec![Value::Int(5)], waiting.clone())
        .unwrap();
    let continuation = parked.borrow()[0].clone();

    let delivered = eval.host_completion();
    eval.start_export(
        eval.function("app.deliver").unwrap(),
        vec![continuation, Value::Int(9)],
        delivered.clone(),
    )
    .unwrap();

    assert_eq!(eval.outcome(&delivered), Some(Outcome::Success(Value::Unit)));
    assert_eq!(eval.outcome(&waiting), Some(Outcome::Success(Value::Int(9))));
    assert_eq!(eval.suspended_stacks(), 0);
}

#[test]
fn finished_stack_cannot_be_resumed() {
    let eval = evaluator();
    let parked = park_with(&eval, Value::Suspended);
    let completion = eval.host_completion();
    let stack = eval
        .start_export(eval.function("app.main").unwrap(), vec![Value::Int(5)], completion)
        .unwrap();
    let continuation = parked.borrow()[0].clone();
    eval.resume_with(&continuation, Outcome::Success(Value::Int(1))).unwrap();

    assert_eq!(
        eval.resume_with(&continuation, Outcome::Success(Value::Int(2))),
        Err(EvalError::StackNotSuspended { stack: stack.0 })
    );
}

#[test]
fn host_completion_accepts_one_outcome() {
    let eval = evaluator();
    let completion = eval.host_completion();
    eval.resume_with(&completion, Outcome::Success(Value::Unit)).unwrap();
    assert_eq!(
        eval.resume_with(&completion, Outcome::Success(Value::Unit)),
        Err(EvalError::AlreadyCompleted { completion: 0 })
    );
}

#[test]
fn bodiless_function_needs_a_native() {
    let eval = evaluator();
    assert!(matches!(
        eval.call("app.park", vec![Value::Null]),
        Err(EvalError::NoBody { .. })
    ));
}
