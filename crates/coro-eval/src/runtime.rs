//! Stacks, continuations and the host side of the runtime.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use corosensei::{Coroutine, CoroutineResult, Yielder};

use coro_ir::{FunctionId, Program};
use coro_lower::Builtins;

use crate::error::EvalError;
use crate::interp::Interp;
use crate::value::{FunctionValue, Outcome, StackId, Value};

/// Host implementation of a bodiless function. `Err` throws the value.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, Value>>;

type Stack = Coroutine<Outcome, (), Result<(), EvalError>>;

pub(crate) struct Shared {
    pub program: Program,
    pub builtins: Builtins,
    pub state: RefCell<State>,
}

#[derive(Default)]
pub(crate) struct State {
    pub natives: BTreeMap<FunctionId, NativeFn>,
    /// Host completions by id; `Some` once an outcome was delivered.
    completions: BTreeMap<u32, Option<Outcome>>,
    /// Outcomes for suspended stacks, delivered in order once control is
    /// back on the host.
    pending: VecDeque<(StackId, Outcome)>,
    /// Stacks that are suspended or not yet started.
    stacks: BTreeMap<StackId, Stack>,
    next_stack: u32,
}

impl Shared {
    /// Hand `outcome` to `continuation`.
    pub fn deliver(&self, continuation: &Value, outcome: Outcome) -> Result<(), EvalError> {
        let mut state = self.state.borrow_mut();
        match continuation {
            Value::HostCompletion(id) => match state.completions.get_mut(id) {
                Some(slot) if slot.is_none() => {
                    tracing::debug!(target: "coro_eval", completion = id, success = outcome.is_success(), "host completion resumed");
                    *slot = Some(outcome);
                    Ok(())
                }
                Some(_) => Err(EvalError::AlreadyCompleted { completion: *id }),
                None => Err(EvalError::mismatch("continuation", continuation)),
            },
            Value::Coroutine(stack) => {
                state.pending.push_back((*stack, outcome));
                Ok(())
            }
            other => Err(EvalError::mismatch("continuation", other)),
        }
    }
}

/// Runs a lowered program. Each export call gets its own stack; a stack
/// that suspends hands control back to the host until its coroutine is
/// resumed.
pub struct Evaluator {
    shared: Rc<Shared>,
}

impl Evaluator {
    pub fn new(program: Program, builtins: Builtins) -> Self {
        Self {
            shared: Rc::new(Shared {
                program,
                builtins,
                state: RefCell::default(),
            }),
        }
    }

    pub fn program(&self) -> &Program {
        &self.shared.program
    }

    /// Supply the body of the bodiless function `fq_name`.
    pub fn bind_native(
        &self,
        fq_name: &str,
        native: impl Fn(&[Value]) -> Result<Value, Value> + 'static,
    ) -> Result<(), EvalError> {
        let function = self.lookup(fq_name)?;
        self.shared
            .state
            .borrow_mut()
            .natives
            .insert(function, Rc::new(native));
        Ok(())
    }

    /// Function value for a declared function.
    pub fn function(&self, fq_name: &str) -> Result<Value, EvalError> {
        Ok(Value::Function(FunctionValue::new(self.lookup(fq_name)?)))
    }

    /// Call a plain function directly on the host stack.
    pub fn call(&self, fq_name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let function = self.lookup(fq_name)?;
        Interp::host(Rc::clone(&self.shared)).call(function, args)
    }

    /// A fresh continuation owned by the host.
    pub fn host_completion(&self) -> Value {
        let mut state = self.shared.state.borrow_mut();
        let id = state.completions.len() as u32;
        state.completions.insert(id, None);
        Value::HostCompletion(id)
    }

    /// Outcome delivered to a host completion, if any.
    pub fn outcome(&self, completion: &Value) -> Option<Outcome> {
        let Value::HostCompletion(id) = completion else {
            return None;
        };
        self.shared.state.borrow().completions.get(id).cloned().flatten()
    }

    /// Call the export trampoline for `args.len()` on a new stack with
    /// `callable`, `args` and `completion`. Runs until every stack is
    /// finished or suspended.
    pub fn start_export(
        &self,
        callable: Value,
        args: Vec<Value>,
        completion: Value,
    ) -> Result<StackId, EvalError> {
        let arity = args.len();
        let name = self
            .shared
            .builtins
            .names
            .export_functions
            .get(arity)
            .ok_or(EvalError::ExportArity { arity })?;
        let trampoline = self.lookup(name)?;

        let stack = {
            let mut state = self.shared.state.borrow_mut();
            let stack = StackId(state.next_stack);
            state.next_stack += 1;
            stack
        };
        let mut full = Vec::with_capacity(arity + 3);
        full.push(callable);
        full.extend(args);
        full.push(completion);
        full.push(Value::Suspender(stack));

        let shared = Rc::clone(&self.shared);
        let coroutine: Stack = Coroutine::new(move |yielder: &Yielder<Outcome, ()>, _start: Outcome| {
            Interp::on_stack(shared, yielder, stack).call(trampoline, full).map(drop)
        });
        self.shared.state.borrow_mut().stacks.insert(stack, coroutine);
        tracing::debug!(target: "coro_eval", stack = stack.0, arity, "starting export");

        self.run(stack, Outcome::Success(Value::Unit))?;
        self.drain()?;
        Ok(stack)
    }

    /// Resume `continuation` from the host, then run every stack that became
    /// runnable.
    pub fn resume_with(&self, continuation: &Value, outcome: Outcome) -> Result<(), EvalError> {
        self.shared.deliver(continuation, outcome)?;
        self.drain()
    }

    /// Number of stacks waiting to be resumed.
    pub fn suspended_stacks(&self) -> usize {
        self.shared.state.borrow().stacks.len()
    }

    fn lookup(&self, fq_name: &str) -> Result<FunctionId, EvalError> {
        self.shared
            .program
            .find_function(fq_name)
            .ok_or_else(|| EvalError::UnknownFunction {
                name: fq_name.to_string(),
            })
    }

    fn drain(&self) -> Result<(), EvalError> {
        loop {
            let next = self.shared.state.borrow_mut().pending.pop_front();
            let Some((stack, outcome)) = next else {
                return Ok(());
            };
            self.run(stack, outcome)?;
        }
    }

    fn run(&self, stack: StackId, input: Outcome) -> Result<(), EvalError> {
        let coroutine = self.shared.state.borrow_mut().stacks.remove(&stack);
        let mut coroutine = coroutine.ok_or(EvalError::StackNotSuspended { stack: stack.0 })?;
        match coroutine.resume(input) {
            CoroutineResult::Yield(()) => {
                self.shared.state.borrow_mut().stacks.insert(stack, coroutine);
                Ok(())
            }
            CoroutineResult::Return(result) => {
                tracing::debug!(target: "coro_eval", stack = stack.0, ok = result.is_ok(), "stack finished");
                result
            }
        }
    }
}
