//! Convenience constructors for expression nodes.

use coro_types::{ClassId, Type};

use crate::{
    Call, Catch, ExprId, ExprKind, FunctionId, Literal, ParamId, Program, Span, StatementOrigin,
    ValueRef, VarId, VarOrigin, Variable,
};

/// Allocates expressions in a [`Program`], stamping them with one span.
pub struct IrBuilder<'a> {
    program: &'a mut Program,
    span: Span,
}

impl<'a> IrBuilder<'a> {
    pub fn new(program: &'a mut Program, span: Span) -> Self {
        Self { program, span }
    }

    pub fn program(&mut self) -> &mut Program {
        &mut *self.program
    }

    pub fn expr(&mut self, kind: ExprKind, ty: Type) -> ExprId {
        self.program.add_expr(kind, ty, self.span)
    }

    // -- constants ----------------------------------------------------------

    pub fn unit(&mut self) -> ExprId {
        self.expr(ExprKind::Const(Literal::Unit), Type::Unit)
    }

    pub fn null(&mut self) -> ExprId {
        self.expr(ExprKind::Const(Literal::Null), Type::NullableAny)
    }

    pub fn bool(&mut self, value: bool) -> ExprId {
        self.expr(ExprKind::Const(Literal::Bool(value)), Type::Bool)
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.expr(ExprKind::Const(Literal::Int(value)), Type::Int)
    }

    pub fn string(&mut self, value: impl Into<String>) -> ExprId {
        self.expr(ExprKind::Const(Literal::String(value.into())), Type::String)
    }

    // -- values -------------------------------------------------------------

    pub fn get_param(&mut self, param: ParamId) -> ExprId {
        let ty = self.program.param(param).ty.clone();
        self.expr(ExprKind::Get(ValueRef::Param(param)), ty)
    }

    pub fn get_var(&mut self, var: VarId) -> ExprId {
        let ty = self.program.var(var).ty.clone();
        self.expr(ExprKind::Get(ValueRef::Var(var)), ty)
    }

    pub fn set(&mut self, var: VarId, value: ExprId) -> ExprId {
        self.expr(ExprKind::Set { var, value }, Type::Unit)
    }

    /// Declare a mutable local and return it with its declaration statement.
    pub fn var(&mut self, name: &str, ty: Type, init: Option<ExprId>) -> (VarId, ExprId) {
        self.var_with_origin(name, ty, init, VarOrigin::Defined)
    }

    pub fn var_with_origin(
        &mut self,
        name: &str,
        ty: Type,
        init: Option<ExprId>,
        origin: VarOrigin,
    ) -> (VarId, ExprId) {
        let var = self.program.add_var(Variable {
            name: name.to_string(),
            ty,
            mutable: true,
            origin,
        });
        let decl = self.expr(ExprKind::VarDecl { var, init }, Type::Unit);
        (var, decl)
    }

    pub fn get_object(&mut self, class: ClassId) -> ExprId {
        self.expr(ExprKind::GetObject(class), Type::simple(class))
    }

    pub fn function_ref(&mut self, function: FunctionId, ty: Type) -> ExprId {
        self.expr(ExprKind::FunctionRef(function), ty)
    }

    pub fn local_function(&mut self, function: FunctionId) -> ExprId {
        self.expr(ExprKind::LocalFunction(function), Type::Unit)
    }

    // -- calls and control flow --------------------------------------------

    pub fn call(&mut self, call: Call, ty: Type) -> ExprId {
        self.expr(ExprKind::Call(call), ty)
    }

    /// Call `callee` on `receiver`.
    pub fn member_call(
        &mut self,
        callee: FunctionId,
        receiver: ExprId,
        args: Vec<ExprId>,
        ty: Type,
    ) -> ExprId {
        let mut call = Call::new(callee, args);
        call.dispatch_receiver = Some(receiver);
        self.call(call, ty)
    }

    pub fn block(&mut self, statements: Vec<ExprId>, ty: Type) -> ExprId {
        self.expr(
            ExprKind::Block {
                statements,
                composite: false,
                origin: None,
            },
            ty,
        )
    }

    pub fn composite(
        &mut self,
        statements: Vec<ExprId>,
        ty: Type,
        origin: Option<StatementOrigin>,
    ) -> ExprId {
        self.expr(
            ExprKind::Block {
                statements,
                composite: true,
                origin,
            },
            ty,
        )
    }

    pub fn if_else(
        &mut self,
        condition: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
        ty: Type,
    ) -> ExprId {
        self.expr(
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
                origin: None,
            },
            ty,
        )
    }

    pub fn ret(&mut self, target: FunctionId, value: ExprId) -> ExprId {
        self.expr(ExprKind::Return { target, value }, Type::Nothing)
    }

    pub fn throw(&mut self, value: ExprId) -> ExprId {
        self.expr(ExprKind::Throw(value), Type::Nothing)
    }

    /// `try { body } catch (name: Throwable) { handler(name) }`.
    pub fn try_catch(
        &mut self,
        body: ExprId,
        name: &str,
        handler: impl FnOnce(&mut Self, VarId) -> ExprId,
        ty: Type,
    ) -> ExprId {
        let param = self.program.add_var(Variable {
            name: name.to_string(),
            ty: Type::Throwable,
            mutable: false,
            origin: VarOrigin::CatchParameter,
        });
        let catch_body = handler(self, param);
        self.expr(
            ExprKind::Try {
                body,
                catches: vec![Catch {
                    param,
                    body: catch_body,
                }],
                finally: None,
            },
            ty,
        )
    }
}
