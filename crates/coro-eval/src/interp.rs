//! Tree-walking interpreter for lowered programs.

use std::rc::Rc;

use corosensei::Yielder;

use coro_ir::{Body, Call, ExprId, ExprKind, FunctionId, Literal, Parent, ValueRef};

use crate::error::EvalError;
use crate::frame::Frame;
use crate::runtime::Shared;
use crate::value::{FunctionValue, Outcome, StackId, Value};

/// Non-local exits while evaluating an expression.
pub(crate) enum Flow {
    Return { target: FunctionId, value: Value },
    Throw(Value),
    Fault(EvalError),
}

impl From<EvalError> for Flow {
    fn from(err: EvalError) -> Self {
        Flow::Fault(err)
    }
}

type Eval = Result<Value, Flow>;

pub(crate) struct Interp<'y> {
    shared: Rc<Shared>,
    yielder: Option<&'y Yielder<Outcome, ()>>,
    stack: Option<StackId>,
}

impl<'y> Interp<'y> {
    /// Interpreter for the host, where suspension is not possible.
    pub fn host(shared: Rc<Shared>) -> Self {
        Self {
            shared,
            yielder: None,
            stack: None,
        }
    }

    pub fn on_stack(shared: Rc<Shared>, yielder: &'y Yielder<Outcome, ()>, stack: StackId) -> Self {
        Self {
            shared,
            yielder: Some(yielder),
            stack: Some(stack),
        }
    }

    /// Call `function` with every argument supplied.
    pub fn call(&self, function: FunctionId, args: Vec<Value>) -> Result<Value, EvalError> {
        let program = &self.shared.program;
        match self.apply(function, None, args.into_iter().map(Some).collect(), None) {
            Ok(value) => Ok(value),
            Err(Flow::Throw(value)) => Err(EvalError::Uncaught {
                value: value.to_string(),
            }),
            Err(Flow::Return { target, .. }) => Err(EvalError::StrayReturn {
                target: program.function_label(target),
            }),
            Err(Flow::Fault(err)) => Err(err),
        }
    }

    fn apply(
        &self,
        callee: FunctionId,
        receiver: Option<Value>,
        args: Vec<Option<Value>>,
        env: Option<Rc<Frame>>,
    ) -> Eval {
        let shared = &*self.shared;
        let program = &shared.program;
        let builtins = &shared.builtins;
        let f = program.function(callee);

        let native = shared.state.borrow().natives.get(&callee).cloned();
        if let Some(native) = native {
            let args = self.all_args(callee, args)?;
            return native(&args).map_err(Flow::Throw);
        }

        if callee == builtins.suspend_primitive {
            let [_completion, suspender] = self.args::<2>(callee, args)?;
            return self.suspend(callee, &suspender);
        }
        if callee == builtins.resume_primitive {
            let [result, continuation, _suspender] = self.args::<3>(callee, args)?;
            shared.deliver(&continuation, outcome_of(&result)?)?;
            return Ok(Value::Unit);
        }
        if callee == builtins.suspended_marker {
            return Ok(Value::Suspended);
        }
        if callee == builtins.identity_equals {
            let [a, b] = self.args::<2>(callee, args)?;
            return Ok(Value::Bool(a == b));
        }
        if callee == builtins.ref_cast {
            let [value] = self.args::<1>(callee, args)?;
            return Ok(value);
        }
        if callee == builtins.coroutine_constructor {
            let [suspender] = self.args::<1>(callee, args)?;
            return match suspender {
                Value::Suspender(stack) => Ok(Value::Coroutine(stack)),
                other => Err(EvalError::mismatch("suspender", &other).into()),
            };
        }
        if callee == builtins.result_success || callee == builtins.result_failure {
            let [value] = self.args::<1>(callee, args)?;
            let outcome = if callee == builtins.result_success {
                Outcome::Success(value)
            } else {
                Outcome::Failure(value)
            };
            return Ok(Value::Outcome(Rc::new(outcome)));
        }

        if f.is_suspend {
            return Err(EvalError::UnloweredSuspendCall {
                function: program.function_label(callee),
            }
            .into());
        }
        if f.body.is_none() {
            match receiver {
                Some(receiver) if f.name == builtins.names.resume_with => {
                    let [result] = self.args::<1>(callee, args)?;
                    shared.deliver(&receiver, outcome_of(&result)?)?;
                    return Ok(Value::Unit);
                }
                Some(Value::Function(function)) if f.name == builtins.names.invoke => {
                    let args = self.all_args(callee, args)?;
                    return self.call_value(function, args);
                }
                _ => {
                    return Err(EvalError::NoBody {
                        function: program.function_label(callee),
                    }
                    .into());
                }
            }
        }
        self.run_body(callee, receiver, args, env)
    }

    /// Invoke a function value. A callee expecting one more argument than
    /// given, invoked with a coroutine last, also receives that coroutine's
    /// suspender.
    fn call_value(&self, function: FunctionValue, mut args: Vec<Value>) -> Eval {
        let target = self.shared.program.function(function.function);
        if target.params.len() == args.len() + 1
            && let Some(Value::Coroutine(stack)) = args.last()
        {
            let suspender = Value::Suspender(*stack);
            args.push(suspender);
        }
        let args = args.into_iter().map(Some).collect();
        self.apply(function.function, None, args, function.env)
    }

    fn run_body(
        &self,
        callee: FunctionId,
        receiver: Option<Value>,
        args: Vec<Option<Value>>,
        env: Option<Rc<Frame>>,
    ) -> Eval {
        let program = &self.shared.program;
        let f = program.function(callee);
        let frame = Frame::new(callee, env);
        if let (Some(param), Some(receiver)) = (f.dispatch_receiver, receiver) {
            frame.bind_param(param, receiver);
        }
        let mut args = args.into_iter();
        for (index, param) in f.params.iter().enumerate() {
            let value = match args.next().flatten() {
                Some(value) => value,
                None => match program.param(*param).default_value {
                    Some(default) => self.eval(&frame, default)?,
                    None => {
                        return Err(EvalError::MissingArgument {
                            function: program.function_label(callee),
                            index,
                        }
                        .into());
                    }
                },
            };
            frame.bind_param(*param, value);
        }

        let result = match &f.body {
            Some(Body::Expression(expr)) => self.eval(&frame, *expr),
            Some(Body::Block(statements)) => statements
                .iter()
                .try_for_each(|s| self.eval(&frame, *s).map(drop))
                .map(|()| Value::Unit),
            None => Err(EvalError::NoBody {
                function: program.function_label(callee),
            }
            .into()),
        };
        match result {
            Err(Flow::Return { target, value }) if target == callee => Ok(value),
            other => other,
        }
    }

    /// The first `count` arguments, all of which must be present.
    fn leading_args(
        &self,
        callee: FunctionId,
        args: Vec<Option<Value>>,
        count: usize,
    ) -> Result<Vec<Value>, EvalError> {
        let mut args = args.into_iter();
        (0..count)
            .map(|index| {
                args.next()
                    .flatten()
                    .ok_or_else(|| EvalError::MissingArgument {
                        function: self.shared.program.function_label(callee),
                        index,
                    })
            })
            .collect()
    }

    fn all_args(&self, callee: FunctionId, args: Vec<Option<Value>>) -> Result<Vec<Value>, Flow> {
        let count = self.shared.program.function(callee).params.len();
        Ok(self.leading_args(callee, args, count)?)
    }

    /// Exactly `N` arguments, for builtins with a fixed shape.
    fn args<const N: usize>(
        &self,
        callee: FunctionId,
        args: Vec<Option<Value>>,
    ) -> Result<[Value; N], Flow> {
        let values = self.leading_args(callee, args, N)?;
        <[Value; N]>::try_from(values).map_err(|values| {
            Flow::Fault(EvalError::MissingArgument {
                function: self.shared.program.function_label(callee),
                index: values.len(),
            })
        })
    }

    fn suspend(&self, callee: FunctionId, suspender: &Value) -> Eval {
        let Value::Suspender(stack) = suspender else {
            return Err(EvalError::mismatch("suspender", suspender).into());
        };
        if self.stack != Some(*stack) {
            return Err(EvalError::ForeignSuspender {
                value: suspender.to_string(),
            }
            .into());
        }
        let Some(yielder) = self.yielder else {
            return Err(EvalError::SuspendOutsideStack {
                function: self.shared.program.function_label(callee),
            }
            .into());
        };
        tracing::debug!(target: "coro_eval", stack = stack.0, "suspending stack");
        let outcome = yielder.suspend(());
        tracing::debug!(target: "coro_eval", stack = stack.0, success = outcome.is_success(), "stack resumed");
        match outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(exception) => Err(Flow::Throw(exception)),
        }
    }

    fn eval(&self, frame: &Rc<Frame>, id: ExprId) -> Eval {
        let program = &self.shared.program;
        let unbound = |name: &str| {
            Flow::Fault(EvalError::Unbound {
                name: name.to_string(),
                function: program.function_label(frame.function),
            })
        };
        match &program.expr(id).kind {
            ExprKind::Const(literal) => Ok(match literal {
                Literal::Unit => Value::Unit,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::String(s) => Value::str(s),
            }),
            ExprKind::Get(ValueRef::Param(p)) => frame
                .param(*p)
                .ok_or_else(|| unbound(&program.param(*p).name)),
            ExprKind::Get(ValueRef::Var(v)) => {
                frame.var(*v).ok_or_else(|| unbound(&program.var(*v).name))
            }
            ExprKind::Set { var, value } => {
                let value = self.eval(frame, *value)?;
                if !frame.assign(*var, value) {
                    return Err(unbound(&program.var(*var).name));
                }
                Ok(Value::Unit)
            }
            ExprKind::VarDecl { var, init } => {
                let value = match init {
                    Some(init) => self.eval(frame, *init)?,
                    None => Value::Null,
                };
                frame.declare(*var, value);
                Ok(Value::Unit)
            }
            ExprKind::Call(call) => self.eval_call(frame, call),
            ExprKind::GetObject(class) => Ok(Value::Object(*class)),
            ExprKind::FunctionRef(function) => {
                let env = match program.function(*function).parent {
                    Parent::Function(owner) => frame.find(owner),
                    Parent::File(_) | Parent::Class(_) => None,
                };
                Ok(Value::Function(FunctionValue {
                    function: *function,
                    env,
                }))
            }
            ExprKind::LocalFunction(_) => Ok(Value::Unit),
            ExprKind::Block { statements, .. } => {
                let mut last = Value::Unit;
                for statement in statements {
                    last = self.eval(frame, *statement)?;
                }
                Ok(last)
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => match self.eval(frame, *condition)? {
                Value::Bool(true) => self.eval(frame, *then_branch),
                Value::Bool(false) => match else_branch {
                    Some(else_branch) => self.eval(frame, *else_branch),
                    None => Ok(Value::Unit),
                },
                other => Err(EvalError::mismatch("condition", &other).into()),
            },
            ExprKind::Return { target, value } => {
                let value = self.eval(frame, *value)?;
                Err(Flow::Return {
                    target: *target,
                    value,
                })
            }
            ExprKind::Throw(value) => Err(Flow::Throw(self.eval(frame, *value)?)),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                let mut result = self.eval(frame, *body);
                if let Some(catch) = catches.first() {
                    result = match result {
                        Err(Flow::Throw(exception)) => {
                            frame.declare(catch.param, exception);
                            self.eval(frame, catch.body)
                        }
                        other => other,
                    };
                }
                if let Some(finally) = finally {
                    self.eval(frame, *finally)?;
                }
                result
            }
        }
    }

    fn eval_call(&self, frame: &Rc<Frame>, call: &Call) -> Eval {
        let program = &self.shared.program;
        let receiver = match call.dispatch_receiver {
            Some(receiver) => Some(self.eval(frame, receiver)?),
            None => None,
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(match arg {
                Some(arg) => Some(self.eval(frame, *arg)?),
                None => None,
            });
        }
        let env = match program.function(call.callee).parent {
            Parent::Function(owner) => frame.find(owner),
            Parent::File(_) | Parent::Class(_) => None,
        };
        self.apply(call.callee, receiver, args, env)
    }
}

fn outcome_of(value: &Value) -> Result<Outcome, EvalError> {
    match value {
        Value::Outcome(outcome) => Ok((**outcome).clone()),
        other => Err(EvalError::mismatch("outcome", other)),
    }
}
