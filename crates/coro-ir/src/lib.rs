//! Typed tree IR for the coroutine lowering pipeline.
//!
//! Every node lives in an arena owned by [`Program`] and is addressed by a
//! stable integer handle. Parents refer to children by handle, so replacing a
//! child means writing a new handle into the parent's slot; superseded nodes
//! stay in the arena and are simply no longer reachable from a declaration
//! list.
//!
//! A `Program` is one compilation unit. Declarations reachable from
//! `Program::files` are the live output; functions that were replaced by a
//! lowering pass keep their arena entries so that other passes can still ask
//! questions about them (is the callee suspendable, what was its name).

pub mod builder;
pub mod render;
pub mod walk;

use coro_types::{ClassId, Type, TypeNames, TypeParamId};

pub use builder::IrBuilder;
pub use render::{render_function, render_program};
pub use walk::ValueRemap;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub u32);

/// Byte range in the source that produced a node. Synthesized nodes reuse
/// the span of the node they were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn synthetic() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A source file: a package plus an ordered declaration list.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub name: String,
    pub package: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Declaration {
    Function(FunctionId),
    Class(ClassId),
}

/// Owner of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    File(FileId),
    Class(ClassId),
    /// Local functions and lambdas are owned by the function whose body
    /// declares them.
    Function(FunctionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub kind: ClassKind,
    pub parent: Parent,
    pub type_params: Vec<TypeParamId>,
    /// Direct supertypes only.
    pub supertypes: Vec<Type>,
    pub declarations: Vec<Declaration>,
    pub companion: Option<ClassId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_inline: bool,
    pub is_external: bool,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FunctionKind {
    #[default]
    Simple,
    Constructor,
}

/// Where a declaration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeclOrigin {
    #[default]
    Defined,
    Lambda,
    /// Declared by the runtime library; bodies may be supplied by the
    /// target instead of the IR.
    Intrinsic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub parent: Parent,
    pub kind: FunctionKind,
    pub origin: DeclOrigin,
    pub modifiers: Modifiers,
    pub annotations: Vec<String>,
    pub type_params: Vec<TypeParamId>,
    pub dispatch_receiver: Option<ParamId>,
    pub params: Vec<ParamId>,
    pub return_type: Type,
    pub is_suspend: bool,
    pub overridden: Vec<FunctionId>,
    pub body: Option<Body>,
    pub span: Span,
}

impl Function {
    pub fn is_local(&self) -> bool {
        matches!(self.parent, Parent::Function(_))
    }
}

/// Role of a value parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamOrigin {
    #[default]
    Defined,
    DispatchReceiver,
    /// Trailing completion handle appended to stubs.
    Completion,
    /// Trailing stack-switch capability appended to stubs.
    Suspender,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueParam {
    pub name: String,
    pub ty: Type,
    pub default_value: Option<ExprId>,
    pub origin: ParamOrigin,
    pub owner: FunctionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeParamOwner {
    Function(FunctionId),
    Class(ClassId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub owner: TypeParamOwner,
    pub upper_bound: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VarOrigin {
    #[default]
    Defined,
    /// Holds the value returned by a suspend callback.
    SuspendResult,
    CatchParameter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub origin: VarOrigin,
}

/// Function body: a statement block or a single expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Block(Vec<ExprId>),
    Expression(ExprId),
}

impl Body {
    pub fn roots(&self) -> Vec<ExprId> {
        match self {
            Body::Block(statements) => statements.clone(),
            Body::Expression(expr) => vec![*expr],
        }
    }

    pub fn roots_mut(&mut self) -> Vec<&mut ExprId> {
        match self {
            Body::Block(statements) => statements.iter_mut().collect(),
            Body::Expression(expr) => vec![expr],
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueRef {
    Param(ParamId),
    Var(VarId),
}

/// Marks nodes introduced by a lowering so later stages can recognise them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementOrigin {
    LoweredSuspendIntrinsic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: FunctionId,
    pub dispatch_receiver: Option<ExprId>,
    pub super_qualifier: Option<ClassId>,
    /// Positional value arguments; `None` leaves the parameter's default.
    pub args: Vec<Option<ExprId>>,
    pub type_args: Vec<Type>,
    pub origin: Option<StatementOrigin>,
}

impl Call {
    pub fn new(callee: FunctionId, args: Vec<ExprId>) -> Self {
        Self {
            callee,
            dispatch_receiver: None,
            super_qualifier: None,
            args: args.into_iter().map(Some).collect(),
            type_args: Vec::new(),
            origin: None,
        }
    }

    pub fn arg(&self, index: usize) -> Option<ExprId> {
        self.args.get(index).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub param: VarId,
    pub body: ExprId,
}

/// Closed set of expression kinds. Adding a kind forces every traversal in
/// `walk` and every pass `match` to be revisited.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Literal),
    Get(ValueRef),
    Set {
        var: VarId,
        value: ExprId,
    },
    VarDecl {
        var: VarId,
        init: Option<ExprId>,
    },
    Call(Call),
    /// Singleton instance of an object class.
    GetObject(ClassId),
    /// Function value referring to a declared function.
    FunctionRef(FunctionId),
    /// Declaration statement for a local function; its body is owned by the
    /// local function, not by this node.
    LocalFunction(FunctionId),
    Block {
        statements: Vec<ExprId>,
        /// Composite blocks do not open a scope.
        composite: bool,
        origin: Option<StatementOrigin>,
    },
    If {
        condition: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
        origin: Option<StatementOrigin>,
    },
    Return {
        target: FunctionId,
        value: ExprId,
    },
    Throw(ExprId),
    Try {
        body: ExprId,
        catches: Vec<Catch>,
        finally: Option<ExprId>,
    },
}

// ---------------------------------------------------------------------------
// Program arena
// ---------------------------------------------------------------------------

/// One compilation unit and the arenas backing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub name: String,
    pub files: Vec<File>,
    functions: Vec<Function>,
    params: Vec<ValueParam>,
    type_params: Vec<TypeParam>,
    classes: Vec<Class>,
    vars: Vec<Variable>,
    exprs: Vec<Expr>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // -- allocation ---------------------------------------------------------

    pub fn add_file(&mut self, name: impl Into<String>, package: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(File {
            name: name.into(),
            package: package.into(),
            declarations: Vec::new(),
        });
        id
    }

    /// Allocate a class and append it to its parent's declaration list.
    pub fn add_class(&mut self, name: impl Into<String>, kind: ClassKind, parent: Parent) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            name: name.into(),
            kind,
            parent,
            type_params: Vec::new(),
            supertypes: Vec::new(),
            declarations: Vec::new(),
            companion: None,
        });
        self.push_declaration(parent, Declaration::Class(id));
        id
    }

    /// Allocate a function and append it to its parent's declaration list.
    /// Local functions (parent is a function) are not listed anywhere; they
    /// are reached through `ExprKind::LocalFunction` / `ExprKind::FunctionRef`.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        parent: Parent,
        return_type: Type,
    ) -> FunctionId {
        let id = self.alloc_function(Function {
            name: name.into(),
            parent,
            kind: FunctionKind::Simple,
            origin: DeclOrigin::Defined,
            modifiers: Modifiers::default(),
            annotations: Vec::new(),
            type_params: Vec::new(),
            dispatch_receiver: None,
            params: Vec::new(),
            return_type,
            is_suspend: false,
            overridden: Vec::new(),
            body: None,
            span: Span::synthetic(),
        });
        self.push_declaration(parent, Declaration::Function(id));
        id
    }

    /// Allocate a function without listing it in any container.
    pub fn alloc_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    /// Allocate a value parameter and append it to the owner's parameters.
    pub fn add_param(&mut self, owner: FunctionId, name: impl Into<String>, ty: Type) -> ParamId {
        self.add_param_with_origin(owner, name, ty, ParamOrigin::Defined)
    }

    pub fn add_param_with_origin(
        &mut self,
        owner: FunctionId,
        name: impl Into<String>,
        ty: Type,
        origin: ParamOrigin,
    ) -> ParamId {
        let id = self.alloc_param(ValueParam {
            name: name.into(),
            ty,
            default_value: None,
            origin,
            owner,
        });
        self.function_mut(owner).params.push(id);
        id
    }

    /// Allocate the dispatch receiver parameter of a member function.
    pub fn add_dispatch_receiver(&mut self, owner: FunctionId, ty: Type) -> ParamId {
        let id = self.alloc_param(ValueParam {
            name: "<this>".to_string(),
            ty,
            default_value: None,
            origin: ParamOrigin::DispatchReceiver,
            owner,
        });
        self.function_mut(owner).dispatch_receiver = Some(id);
        id
    }

    pub fn alloc_param(&mut self, param: ValueParam) -> ParamId {
        let id = ParamId(self.params.len() as u32);
        self.params.push(param);
        id
    }

    pub fn add_type_param(
        &mut self,
        owner: TypeParamOwner,
        name: impl Into<String>,
    ) -> TypeParamId {
        let id = TypeParamId(self.type_params.len() as u32);
        self.type_params.push(TypeParam {
            name: name.into(),
            owner,
            upper_bound: Type::NullableAny,
        });
        match owner {
            TypeParamOwner::Function(f) => self.function_mut(f).type_params.push(id),
            TypeParamOwner::Class(c) => self.class_mut(c).type_params.push(id),
        }
        id
    }

    pub fn add_var(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    pub fn add_expr(&mut self, kind: ExprKind, ty: Type, span: Span) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, ty, span });
        id
    }

    fn push_declaration(&mut self, parent: Parent, declaration: Declaration) {
        match parent {
            Parent::File(file) => self.files[file.0 as usize].declarations.push(declaration),
            Parent::Class(class) => self.class_mut(class).declarations.push(declaration),
            Parent::Function(_) => {}
        }
    }

    // -- access -------------------------------------------------------------

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn param(&self, id: ParamId) -> &ValueParam {
        &self.params[id.0 as usize]
    }

    pub fn param_mut(&mut self, id: ParamId) -> &mut ValueParam {
        &mut self.params[id.0 as usize]
    }

    pub fn type_param(&self, id: TypeParamId) -> &TypeParam {
        &self.type_params[id.0 as usize]
    }

    pub fn type_param_mut(&mut self, id: TypeParamId) -> &mut TypeParam {
        &mut self.type_params[id.0 as usize]
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0 as usize]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0 as usize]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> + '_ {
        (0..self.functions.len() as u32).map(FunctionId)
    }

    /// The call payload of `expr`, if it is a call.
    pub fn as_call(&self, expr: ExprId) -> Option<&Call> {
        match &self.expr(expr).kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    // -- names --------------------------------------------------------------

    /// Fully-qualified name of a class, e.g. `coro.Result.Companion`.
    pub fn class_fq_name(&self, id: ClassId) -> String {
        let class = self.class(id);
        match self.container_fq_name(class.parent) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}.{}", class.name),
            _ => class.name.clone(),
        }
    }

    /// Fully-qualified name of a non-local function; `None` for locals.
    pub fn function_fq_name(&self, id: FunctionId) -> Option<String> {
        let function = self.function(id);
        let prefix = self.container_fq_name(function.parent)?;
        if prefix.is_empty() {
            Some(function.name.clone())
        } else {
            Some(format!("{prefix}.{}", function.name))
        }
    }

    /// Fully-qualified name, or for a local function its enclosing function's
    /// label followed by the local name.
    pub fn function_label(&self, id: FunctionId) -> String {
        if let Some(name) = self.function_fq_name(id) {
            return name;
        }
        let function = self.function(id);
        match function.parent {
            Parent::Function(outer) => format!("{}.{}", self.function_label(outer), function.name),
            Parent::File(_) | Parent::Class(_) => function.name.clone(),
        }
    }

    fn container_fq_name(&self, parent: Parent) -> Option<String> {
        match parent {
            Parent::File(file) => Some(self.files[file.0 as usize].package.clone()),
            Parent::Class(class) => Some(self.class_fq_name(class)),
            Parent::Function(_) => None,
        }
    }

    // -- lookup -------------------------------------------------------------

    /// Every function currently listed in a file or class declaration list,
    /// in declaration order (classes are expanded in place).
    pub fn declared_functions(&self) -> Vec<FunctionId> {
        let mut out = Vec::new();
        for file in &self.files {
            self.collect_declared_functions(&file.declarations, &mut out);
        }
        out
    }

    fn collect_declared_functions(&self, declarations: &[Declaration], out: &mut Vec<FunctionId>) {
        for declaration in declarations {
            match declaration {
                Declaration::Function(f) => out.push(*f),
                Declaration::Class(c) => {
                    self.collect_declared_functions(&self.class(*c).declarations, out)
                }
            }
        }
    }

    pub fn declared_classes(&self) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut stack: Vec<&[Declaration]> =
            self.files.iter().rev().map(|f| f.declarations.as_slice()).collect();
        while let Some(declarations) = stack.pop() {
            for declaration in declarations {
                if let Declaration::Class(c) = declaration {
                    out.push(*c);
                    stack.push(&self.class(*c).declarations);
                }
            }
        }
        out
    }

    /// Look up a listed function by fully-qualified name.
    pub fn find_function(&self, fq_name: &str) -> Option<FunctionId> {
        self.declared_functions()
            .into_iter()
            .find(|f| self.function_fq_name(*f).as_deref() == Some(fq_name))
    }

    pub fn find_class(&self, fq_name: &str) -> Option<ClassId> {
        self.declared_classes()
            .into_iter()
            .find(|c| self.class_fq_name(*c) == fq_name)
    }

    /// Member function of `class` named `name`, searched in declaration order.
    pub fn find_method(&self, class: ClassId, name: &str) -> Option<FunctionId> {
        self.class(class).declarations.iter().find_map(|d| match d {
            Declaration::Function(f)
                if self.function(*f).kind == FunctionKind::Simple
                    && self.function(*f).name == name =>
            {
                Some(*f)
            }
            _ => None,
        })
    }

    pub fn primary_constructor(&self, class: ClassId) -> Option<FunctionId> {
        self.class(class).declarations.iter().find_map(|d| match d {
            Declaration::Function(f) if self.function(*f).kind == FunctionKind::Constructor => {
                Some(*f)
            }
            _ => None,
        })
    }

    /// Replace `old` with `new` in whichever declaration list holds `old`.
    /// Returns `false` when `old` is not listed.
    pub fn replace_declaration(&mut self, old: FunctionId, new: FunctionId) -> bool {
        let parent = self.function(old).parent;
        let list = match parent {
            Parent::File(file) => &mut self.files[file.0 as usize].declarations,
            Parent::Class(class) => &mut self.classes[class.0 as usize].declarations,
            Parent::Function(_) => return false,
        };
        match list.iter_mut().find(|d| **d == Declaration::Function(old)) {
            Some(slot) => {
                *slot = Declaration::Function(new);
                true
            }
            None => false,
        }
    }
}

impl TypeNames for Program {
    fn class_name(&self, class: ClassId) -> &str {
        &self.class(class).name
    }

    fn type_param_name(&self, param: TypeParamId) -> &str {
        &self.type_param(param).name
    }
}
