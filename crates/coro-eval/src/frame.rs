//! Activation records. A local function's frame links to the frame of the
//! function that declared it, so captured parameters and locals resolve by
//! walking the chain.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use coro_ir::{FunctionId, ParamId, VarId};

use crate::value::Value;

pub(crate) struct Frame {
    pub function: FunctionId,
    pub parent: Option<Rc<Frame>>,
    params: RefCell<BTreeMap<ParamId, Value>>,
    vars: RefCell<BTreeMap<VarId, Value>>,
}

impl Frame {
    pub fn new(function: FunctionId, parent: Option<Rc<Frame>>) -> Rc<Self> {
        Rc::new(Self {
            function,
            parent,
            params: RefCell::default(),
            vars: RefCell::default(),
        })
    }

    pub fn bind_param(&self, param: ParamId, value: Value) {
        self.params.borrow_mut().insert(param, value);
    }

    pub fn declare(&self, var: VarId, value: Value) {
        self.vars.borrow_mut().insert(var, value);
    }

    pub fn param(self: &Rc<Self>, param: ParamId) -> Option<Value> {
        self.chain().find_map(|f| {
            let params = f.params.borrow();
            params.get(&param).cloned()
        })
    }

    pub fn var(self: &Rc<Self>, var: VarId) -> Option<Value> {
        self.chain().find_map(|f| {
            let vars = f.vars.borrow();
            vars.get(&var).cloned()
        })
    }

    /// Assign to the innermost frame holding `var`. Returns `false` when no
    /// frame declares it.
    pub fn assign(self: &Rc<Self>, var: VarId, value: Value) -> bool {
        match self.chain().find(|f| f.vars.borrow().contains_key(&var)) {
            Some(frame) => {
                frame.vars.borrow_mut().insert(var, value);
                true
            }
            None => false,
        }
    }

    /// Innermost frame in the chain running `function`.
    pub fn find(self: &Rc<Self>, function: FunctionId) -> Option<Rc<Frame>> {
        self.chain().find(|f| f.function == function)
    }

    fn chain(self: &Rc<Self>) -> impl Iterator<Item = Rc<Frame>> {
        std::iter::successors(Some(Rc::clone(self)), |f| f.parent.clone())
    }
}
