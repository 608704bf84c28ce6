//! Traversal and in-place rewriting over expression trees.
//!
//! All traversals stop at function boundaries: a `LocalFunction` or
//! `FunctionRef` node has no expression children, so the body of a nested
//! function is only ever reached through that function's own id.

use std::collections::BTreeMap;

use coro_types::TypeSubstitution;

use crate::{Body, Catch, ExprId, ExprKind, FunctionId, ParamId, Parent, Program, ValueRef, VarId};

impl ExprKind {
    /// Direct child expressions, in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        let mut out = Vec::new();
        match self {
            ExprKind::Const(_)
            | ExprKind::Get(_)
            | ExprKind::GetObject(_)
            | ExprKind::FunctionRef(_)
            | ExprKind::LocalFunction(_) => {}
            ExprKind::Set { value, .. } => out.push(*value),
            ExprKind::VarDecl { init, .. } => out.extend(init.iter().copied()),
            ExprKind::Call(call) => {
                out.extend(call.dispatch_receiver.iter().copied());
                out.extend(call.args.iter().flatten().copied());
            }
            ExprKind::Block { statements, .. } => out.extend(statements.iter().copied()),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                out.push(*condition);
                out.push(*then_branch);
                out.extend(else_branch.iter().copied());
            }
            ExprKind::Return { value, .. } => out.push(*value),
            ExprKind::Throw(value) => out.push(*value),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                out.push(*body);
                out.extend(catches.iter().map(|c| c.body));
                out.extend(finally.iter().copied());
            }
        }
        out
    }

    /// Mutable slots holding the direct children, in the same order as
    /// [`ExprKind::children`].
    pub fn children_mut(&mut self) -> Vec<&mut ExprId> {
        let mut out = Vec::new();
        match self {
            ExprKind::Const(_)
            | ExprKind::Get(_)
            | ExprKind::GetObject(_)
            | ExprKind::FunctionRef(_)
            | ExprKind::LocalFunction(_) => {}
            ExprKind::Set { value, .. } => out.push(value),
            ExprKind::VarDecl { init, .. } => out.extend(init.iter_mut()),
            ExprKind::Call(call) => {
                out.extend(call.dispatch_receiver.iter_mut());
                out.extend(call.args.iter_mut().flatten());
            }
            ExprKind::Block { statements, .. } => out.extend(statements.iter_mut()),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                out.push(condition);
                out.push(then_branch);
                out.extend(else_branch.iter_mut());
            }
            ExprKind::Return { value, .. } => out.push(value),
            ExprKind::Throw(value) => out.push(value),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                out.push(body);
                out.extend(catches.iter_mut().map(|c| &mut c.body));
                out.extend(finally.iter_mut());
            }
        }
        out
    }
}

/// Old-to-new bindings applied when a body changes owner.
#[derive(Debug, Clone, Default)]
pub struct ValueRemap {
    pub params: BTreeMap<ParamId, ParamId>,
    pub vars: BTreeMap<VarId, VarId>,
    /// `return@old` becomes `return@new`.
    pub return_targets: BTreeMap<FunctionId, FunctionId>,
    /// Applied to expression types, call type arguments and declared locals.
    pub types: TypeSubstitution,
}

impl ValueRemap {
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
            && self.vars.is_empty()
            && self.return_targets.is_empty()
            && self.types.is_empty()
    }

    fn value(&self, value: ValueRef) -> ValueRef {
        match value {
            ValueRef::Param(p) => ValueRef::Param(self.params.get(&p).copied().unwrap_or(p)),
            ValueRef::Var(v) => ValueRef::Var(self.vars.get(&v).copied().unwrap_or(v)),
        }
    }
}

impl Program {
    /// Pre-order list of every expression reachable from `root` without
    /// crossing into nested functions.
    pub fn subtree(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.expr(id).kind.children();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Every expression in the body of `function`, pre-order.
    pub fn body_exprs(&self, function: FunctionId) -> Vec<ExprId> {
        match &self.function(function).body {
            Some(body) => body.roots().into_iter().flat_map(|r| self.subtree(r)).collect(),
            None => Vec::new(),
        }
    }

    /// Functions declared directly inside `function` (local functions and
    /// lambdas), in allocation order.
    pub fn nested_functions(&self, function: FunctionId) -> Vec<FunctionId> {
        self.function_ids()
            .filter(|f| self.function(*f).parent == Parent::Function(function))
            .collect()
    }

    /// Post-order rewrite of the subtree at `root`. `rewrite` sees each node
    /// after its children were rewritten and may return a replacement handle,
    /// which is written into the parent's slot. Returns the (possibly new)
    /// root handle.
    pub fn rewrite_expr<E>(
        &mut self,
        root: ExprId,
        rewrite: &mut dyn FnMut(&mut Program, ExprId) -> Result<Option<ExprId>, E>,
    ) -> Result<ExprId, E> {
        let children = self.expr(root).kind.children();
        if !children.is_empty() {
            let mut replaced = Vec::with_capacity(children.len());
            for child in children {
                replaced.push(self.rewrite_expr(child, rewrite)?);
            }
            for (slot, new) in self.expr_mut(root).kind.children_mut().into_iter().zip(replaced) {
                *slot = new;
            }
        }
        Ok(rewrite(self, root)?.unwrap_or(root))
    }

    /// Apply [`Program::rewrite_expr`] to every root of `function`'s body.
    /// Nested function bodies are not entered.
    pub fn rewrite_body<E>(
        &mut self,
        function: FunctionId,
        rewrite: &mut dyn FnMut(&mut Program, ExprId) -> Result<Option<ExprId>, E>,
    ) -> Result<(), E> {
        let Some(mut body) = self.function_mut(function).body.take() else {
            return Ok(());
        };
        let mut result = Ok(());
        for slot in body.roots_mut() {
            match self.rewrite_expr(*slot, rewrite) {
                Ok(new) => *slot = new,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.function_mut(function).body = Some(body);
        result
    }

    /// Rewrite value references and return targets in the subtree at `root`.
    pub fn remap_values(&mut self, root: ExprId, remap: &ValueRemap) {
        if remap.is_empty() {
            return;
        }
        for id in self.subtree(root) {
            let expr = self.expr_mut(id);
            if !remap.types.is_empty() {
                expr.ty = expr.ty.substitute(&remap.types);
            }
            let mut declared = None;
            match &mut expr.kind {
                ExprKind::Get(value) => *value = remap.value(*value),
                ExprKind::Set { var, .. } => *var = remap.vars.get(var).copied().unwrap_or(*var),
                ExprKind::Return { target, .. } => {
                    *target = remap.return_targets.get(target).copied().unwrap_or(*target)
                }
                ExprKind::Call(call) if !remap.types.is_empty() => {
                    for arg in &mut call.type_args {
                        *arg = arg.substitute(&remap.types);
                    }
                }
                ExprKind::VarDecl { var, .. } => declared = Some(*var),
                _ => {}
            }
            if let Some(var) = declared
                && !remap.types.is_empty()
            {
                let var = self.var_mut(var);
                var.ty = var.ty.substitute(&remap.types);
            }
        }
    }

    /// Move the body of `from` to `to`, rewriting parameter references and
    /// return targets through `remap`. Local functions of `from` are
    /// re-parented to `to` and their bodies (which may capture `from`'s
    /// parameters or return from it) are remapped as well.
    pub fn move_body(&mut self, from: FunctionId, to: FunctionId, remap: &ValueRemap) {
        let body = self.function_mut(from).body.take();
        if let Some(body) = &body {
            for root in body.roots() {
                self.remap_values(root, remap);
            }
        }
        self.function_mut(to).body = body;

        let mut pending = self.nested_functions(from);
        for local in &pending {
            self.function_mut(*local).parent = Parent::Function(to);
        }
        while let Some(local) = pending.pop() {
            let roots: Vec<ExprId> = self
                .function(local)
                .body
                .as_ref()
                .map(Body::roots)
                .unwrap_or_default();
            for root in roots {
                self.remap_values(root, remap);
            }
            let params = self.function(local).params.clone();
            for param in params {
                if let Some(default) = self.param(param).default_value {
                    self.remap_values(default, remap);
                }
                let param = self.param_mut(param);
                param.ty = param.ty.substitute(&remap.types);
            }
            let function = self.function_mut(local);
            function.return_type = function.return_type.substitute(&remap.types);
            pending.extend(self.nested_functions(local));
        }
    }

    /// Deep-copy the subtree at `root`. Variables declared inside the subtree
    /// are duplicated; references to them are redirected to the copies.
    /// Nested functions are shared, not copied.
    pub fn deep_copy_expr(&mut self, root: ExprId) -> ExprId {
        let mut vars = BTreeMap::new();
        self.deep_copy_with(root, &mut vars)
    }

    fn deep_copy_with(&mut self, id: ExprId, vars: &mut BTreeMap<VarId, VarId>) -> ExprId {
        let expr = self.expr(id).clone();
        let mut kind = expr.kind;
        match &mut kind {
            ExprKind::VarDecl { var, .. } => *var = self.copy_var(*var, vars),
            ExprKind::Try { catches, .. } => {
                for Catch { param, .. } in catches.iter_mut() {
                    *param = self.copy_var(*param, vars);
                }
            }
            _ => {}
        }
        let children = kind.children();
        let copies: Vec<ExprId> = children.into_iter().map(|c| self.deep_copy_with(c, vars)).collect();
        for (slot, new) in kind.children_mut().into_iter().zip(copies) {
            *slot = new;
        }
        match &mut kind {
            ExprKind::Get(ValueRef::Var(v)) | ExprKind::Set { var: v, .. } => {
                *v = vars.get(v).copied().unwrap_or(*v)
            }
            _ => {}
        }
        self.add_expr(kind, expr.ty, expr.span)
    }

    fn copy_var(&mut self, var: VarId, vars: &mut BTreeMap<VarId, VarId>) -> VarId {
        let copy = self.add_var(self.var(var).clone());
        vars.insert(var, copy);
        copy
    }
}
