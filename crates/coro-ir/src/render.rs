//! Deterministic textual dump of a program.
//!
//! The format is for humans and snapshot tests; nothing parses it back.

use std::fmt::Write;

use coro_types::Type;

use crate::{
    Body, ClassKind, Declaration, ExprId, ExprKind, FunctionId, FunctionKind, Literal, Parent,
    Program, ValueRef, Visibility,
};

const INDENT: &str = "    ";

/// Render every file of `program` in declaration order.
pub fn render_program(program: &Program) -> String {
    let mut r = Renderer::new(program);
    for (i, file) in program.files.iter().enumerate() {
        if i > 0 {
            r.out.push('\n');
        }
        let _ = writeln!(r.out, "// file {} (package {})", file.name, file.package);
        for declaration in &file.declarations {
            r.declaration(*declaration, 0);
        }
    }
    r.out
}

/// Render one function declaration, including its body.
pub fn render_function(program: &Program, function: FunctionId) -> String {
    let mut r = Renderer::new(program);
    r.function(function, 0);
    r.out
}

struct Renderer<'a> {
    program: &'a Program,
    out: String,
}

impl<'a> Renderer<'a> {
    fn new(program: &'a Program) -> Self {
        Self {
            program,
            out: String::new(),
        }
    }

    fn ty(&self, ty: &Type) -> String {
        ty.display(self.program).to_string()
    }

    fn pad(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }

    fn declaration(&mut self, declaration: Declaration, depth: usize) {
        match declaration {
            Declaration::Function(f) => self.function(f, depth),
            Declaration::Class(c) => self.class(c, depth),
        }
    }

    fn class(&mut self, class: coro_types::ClassId, depth: usize) {
        let program = self.program;
        let c = program.class(class);
        let keyword = match c.kind {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Object => "object",
        };
        self.pad(depth);
        let _ = write!(self.out, "{keyword} {}", c.name);
        self.type_params(&c.type_params);
        if !c.supertypes.is_empty() {
            let supers: Vec<String> = c.supertypes.iter().map(|t| self.ty(t)).collect();
            let _ = write!(self.out, " : {}", supers.join(", "));
        }
        if c.declarations.is_empty() {
            self.out.push('\n');
            return;
        }
        self.out.push_str(" {\n");
        for declaration in &c.declarations {
            self.declaration(*declaration, depth + 1);
        }
        self.pad(depth);
        self.out.push_str("}\n");
    }

    fn type_params(&mut self, params: &[coro_types::TypeParamId]) {
        if params.is_empty() {
            return;
        }
        let names: Vec<&str> = params
            .iter()
            .map(|p| self.program.type_param(*p).name.as_str())
            .collect();
        let _ = write!(self.out, "<{}>", names.join(", "));
    }

    fn function(&mut self, function: FunctionId, depth: usize) {
        let program = self.program;
        let f = program.function(function);
        self.pad(depth);
        for annotation in &f.annotations {
            let _ = write!(self.out, "@{annotation} ");
        }
        match f.modifiers.visibility {
            Visibility::Public => {}
            Visibility::Internal => self.out.push_str("internal "),
            Visibility::Private => self.out.push_str("private "),
        }
        if f.modifiers.is_external {
            self.out.push_str("external ");
        }
        if f.modifiers.is_inline {
            self.out.push_str("inline ");
        }
        if f.is_suspend {
            self.out.push_str("suspend ");
        }
        match f.kind {
            FunctionKind::Simple => self.out.push_str("fun "),
            FunctionKind::Constructor => self.out.push_str("constructor "),
        }
        self.type_params(&f.type_params);
        if !f.type_params.is_empty() {
            self.out.push(' ');
        }
        if let Some(receiver) = f.dispatch_receiver {
            let _ = write!(self.out, "{}.", self.ty(&program.param(receiver).ty));
        }
        let _ = write!(self.out, "{}(", f.name);
        for (i, param) in f.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let p = program.param(*param);
            let _ = write!(self.out, "{}: {}", p.name, self.ty(&p.ty));
            if let Some(default) = p.default_value {
                let rendered = self.expr(default, depth + 1);
                let _ = write!(self.out, " = {rendered}");
            }
        }
        let _ = write!(self.out, "): {}", self.ty(&f.return_type));
        if !f.overridden.is_empty() {
            let names: Vec<String> = f.overridden.iter().map(|o| self.function_name(*o)).collect();
            let _ = write!(self.out, " overrides {}", names.join(", "));
        }
        match &f.body {
            None => self.out.push('\n'),
            Some(Body::Expression(expr)) => {
                let rendered = self.expr(*expr, depth + 1);
                let _ = writeln!(self.out, " =\n{}{rendered}", INDENT.repeat(depth + 1));
            }
            Some(Body::Block(statements)) => {
                self.out.push_str(" {\n");
                for statement in statements {
                    let rendered = self.expr(*statement, depth + 1);
                    self.pad(depth + 1);
                    self.out.push_str(&rendered);
                    self.out.push('\n');
                }
                self.pad(depth);
                self.out.push_str("}\n");
            }
        }
    }

    fn function_name(&self, function: FunctionId) -> String {
        let program = self.program;
        let f = program.function(function);
        match f.parent {
            Parent::Class(class) => format!("{}.{}", program.class(class).name, f.name),
            Parent::File(_) | Parent::Function(_) => {
                program.function_fq_name(function).unwrap_or_else(|| f.name.clone())
            }
        }
    }

    /// Render an expression; nested lines are indented to `depth`.
    fn expr(&mut self, id: ExprId, depth: usize) -> String {
        let program = self.program;
        let expr = program.expr(id);
        match &expr.kind {
            ExprKind::Const(literal) => match literal {
                Literal::Unit => "Unit".to_string(),
                Literal::Null => "null".to_string(),
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::String(s) => format!("{s:?}"),
            },
            ExprKind::Get(ValueRef::Param(p)) => program.param(*p).name.clone(),
            ExprKind::Get(ValueRef::Var(v)) => program.var(*v).name.clone(),
            ExprKind::Set { var, value } => {
                format!("{} = {}", program.var(*var).name, self.expr(*value, depth))
            }
            ExprKind::VarDecl { var, init } => {
                let v = program.var(*var);
                let keyword = if v.mutable { "var" } else { "val" };
                let mut s = format!("{keyword} {}: {}", v.name, self.ty(&v.ty));
                if let Some(init) = init {
                    let _ = write!(s, " = {}", self.expr(*init, depth));
                }
                s
            }
            ExprKind::Call(call) => {
                let mut s = String::new();
                if let Some(receiver) = call.dispatch_receiver {
                    let _ = write!(s, "{}.", self.expr(receiver, depth));
                }
                if let Some(qualifier) = call.super_qualifier {
                    let _ = write!(s, "super<{}>.", program.class(qualifier).name);
                }
                if call.dispatch_receiver.is_some() {
                    s.push_str(&program.function(call.callee).name);
                } else {
                    s.push_str(&self.function_name(call.callee));
                }
                if !call.type_args.is_empty() {
                    let args: Vec<String> = call.type_args.iter().map(|t| self.ty(t)).collect();
                    let _ = write!(s, "<{}>", args.join(", "));
                }
                let args: Vec<String> = call
                    .args
                    .iter()
                    .map(|a| match a {
                        Some(a) => self.expr(*a, depth),
                        None => "_".to_string(),
                    })
                    .collect();
                let _ = write!(s, "({})", args.join(", "));
                s
            }
            ExprKind::GetObject(class) => program.class_fq_name(*class),
            ExprKind::FunctionRef(function) => format!("::{}", self.function_name(*function)),
            ExprKind::LocalFunction(function) => {
                let mut nested = Renderer::new(program);
                nested.function(*function, depth);
                nested.out.trim().to_string()
            }
            ExprKind::Block {
                statements,
                composite,
                ..
            } => {
                let mut s = String::new();
                if *composite {
                    s.push_str("composite ");
                }
                s.push_str("{\n");
                for statement in statements {
                    let rendered = self.expr(*statement, depth + 1);
                    let _ = writeln!(s, "{}{rendered}", INDENT.repeat(depth + 1));
                }
                let _ = write!(s, "{}}}", INDENT.repeat(depth));
                s
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let mut s = format!(
                    "if ({}) {}",
                    self.expr(*condition, depth),
                    self.expr(*then_branch, depth)
                );
                if let Some(else_branch) = else_branch {
                    let _ = write!(s, " else {}", self.expr(*else_branch, depth));
                }
                s
            }
            ExprKind::Return { target, value } => {
                format!(
                    "return@{} {}",
                    program.function(*target).name,
                    self.expr(*value, depth)
                )
            }
            ExprKind::Throw(value) => format!("throw {}", self.expr(*value, depth)),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                let mut s = format!("try {}", self.expr(*body, depth));
                for catch in catches {
                    let v = program.var(catch.param);
                    let _ = write!(
                        s,
                        " catch ({}: {}) {}",
                        v.name,
                        self.ty(&v.ty),
                        self.expr(catch.body, depth)
                    );
                }
                if let Some(finally) = finally {
                    let _ = write!(s, " finally {}", self.expr(*finally, depth));
                }
                s
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Call, IrBuilder, Span};

    #[test]
    fn renders_function_with_block_body() {
        let mut program = Program::new("unit");
        let file = program.add_file("a.kt", "app");
        let callee = program.add_function("callee", Parent::File(file), Type::Int);
        program.add_param(callee, "x", Type::Int);
        let f = program.add_function("f", Parent::File(file), Type::Int);
        program.function_mut(f).is_suspend = true;
        let p = program.add_param(f, "p", Type::Int);
        let mut b = IrBuilder::new(&mut program, Span::synthetic());
        let arg = b.get_param(p);
        let call = b.call(Call::new(callee, vec![arg]), Type::Int);
        let ret = b.ret(f, call);
        program.function_mut(f).body = Some(Body::Block(vec![ret]));

        assert_eq!(
            render_function(&program, f),
            "suspend fun f(p: Int): Int {\n    return@f app.callee(p)\n}\n"
        );
        assert!(render_program(&program).starts_with("// file a.kt (package app)\nfun callee(x: Int): Int\n"));
    }

    #[test]
    fn renders_composite_blocks_indented() {
        let mut program = Program::new("unit");
        let file = program.add_file("a.kt", "app");
        let f = program.add_function("f", Parent::File(file), Type::Int);
        let mut b = IrBuilder::new(&mut program, Span::synthetic());
        let one = b.int(1);
        let inner = b.composite(vec![one], Type::Int, None);
        let ret = b.ret(f, inner);
        program.function_mut(f).body = Some(Body::Block(vec![ret]));

        assert_eq!(
            render_function(&program, f),
            "fun f(): Int {\n    return@f composite {\n        1\n    }\n}\n"
        );
    }
}
