//! Stub synthesis: every non-local suspend function gets a non-suspend twin
//! that takes a completion and a suspender as trailing parameters.

use std::collections::BTreeMap;

use coro_ir::{
    Function, FunctionId, ParamOrigin, Program, TypeParamOwner, ValueParam, ValueRemap,
};
use coro_types::{Type, TypeSubstitution};

use crate::builtins::Builtins;
use crate::error::LowerError;
use crate::registry::{MappingRegistry, TwinFactory};
use crate::report::{LoweringEvent, LoweringReport};

pub const COMPLETION_PARAM: &str = "$completion";
pub const SUSPENDER_PARAM: &str = "$suspender";

/// Create twins for every suspend function listed in a file or class, in
/// declaration order.
pub fn synthesize_stubs(
    program: &mut Program,
    registry: &mut MappingRegistry,
    builtins: &Builtins,
    report: &mut LoweringReport,
) -> Result<(), LowerError> {
    let mut factory = StubFactory { builtins, report };
    for function in program.declared_functions() {
        let f = program.function(function);
        if !f.is_suspend || f.is_local() {
            continue;
        }
        registry.get_or_create(program, function, &mut factory)?;
    }
    Ok(())
}

struct StubFactory<'a> {
    builtins: &'a Builtins,
    report: &'a mut LoweringReport,
}

impl TwinFactory for StubFactory<'_> {
    fn create_shell(
        &mut self,
        program: &mut Program,
        original: FunctionId,
    ) -> Result<FunctionId, LowerError> {
        let source = program.function(original);
        let shell = Function {
            name: source.name.clone(),
            parent: source.parent,
            kind: source.kind,
            origin: source.origin,
            modifiers: source.modifiers,
            annotations: source.annotations.clone(),
            type_params: Vec::new(),
            dispatch_receiver: None,
            params: Vec::new(),
            return_type: source.return_type.clone(),
            is_suspend: false,
            overridden: Vec::new(),
            body: None,
            span: source.span,
        };
        Ok(program.alloc_function(shell))
    }

    fn populate(
        &mut self,
        program: &mut Program,
        registry: &mut MappingRegistry,
        original: FunctionId,
        twin: FunctionId,
    ) -> Result<(), LowerError> {
        let source = program.function(original).clone();

        // Fresh type parameters. Bounds may mention sibling parameters, so
        // they are substituted once the whole map exists.
        let mut types = TypeSubstitution::new();
        for old in &source.type_params {
            let name = program.type_param(*old).name.clone();
            let new = program.add_type_param(TypeParamOwner::Function(twin), name);
            types.insert(*old, Type::Param(new));
        }
        for (old, new) in source.type_params.iter().zip(program.function(twin).type_params.clone()) {
            let bound = program.type_param(*old).upper_bound.substitute(&types);
            program.type_param_mut(new).upper_bound = bound;
        }
        let return_type = source.return_type.substitute(&types);
        program.function_mut(twin).return_type = return_type.clone();

        let mut params = BTreeMap::new();
        if let Some(receiver) = source.dispatch_receiver {
            let copy = copy_param(program, receiver, twin, &types);
            program.function_mut(twin).dispatch_receiver = Some(copy);
            params.insert(receiver, copy);
        }
        for param in &source.params {
            let copy = copy_param(program, *param, twin, &types);
            program.function_mut(twin).params.push(copy);
            params.insert(*param, copy);
        }

        program.add_param_with_origin(
            twin,
            COMPLETION_PARAM,
            self.builtins.completion_type(return_type),
            ParamOrigin::Completion,
        );
        program.add_param_with_origin(
            twin,
            SUSPENDER_PARAM,
            self.builtins.suspender_type(),
            ParamOrigin::Suspender,
        );

        let mut overridden = Vec::with_capacity(source.overridden.len());
        for o in &source.overridden {
            if program.function(*o).is_suspend {
                overridden.push(registry.get_or_create(program, *o, self)?);
            } else {
                overridden.push(*o);
            }
        }
        program.function_mut(twin).overridden = overridden;

        let remap = ValueRemap {
            params,
            return_targets: BTreeMap::from([(original, twin)]),
            types,
            ..ValueRemap::default()
        };
        for (old, new) in &remap.params {
            if let Some(default) = program.param(*old).default_value {
                let copy = program.deep_copy_expr(default);
                program.remap_values(copy, &remap);
                program.param_mut(*new).default_value = Some(copy);
            }
        }
        if !program.replace_declaration(original, twin) {
            return Err(LowerError::UnlistedDeclaration {
                function: program.function_label(original),
            });
        }
        program.move_body(original, twin, &remap);

        let label = program.function_label(original);
        tracing::debug!(
            target: "coro_lower",
            function = %label,
            original = original.0,
            twin = twin.0,
            arity = source.params.len(),
            "created stub"
        );
        self.report.record(LoweringEvent::StubCreated {
            original: label,
            arity: source.params.len(),
        });
        Ok(())
    }
}

fn copy_param(
    program: &mut Program,
    param: coro_ir::ParamId,
    owner: FunctionId,
    types: &TypeSubstitution,
) -> coro_ir::ParamId {
    let old = program.param(param);
    let copy = ValueParam {
        name: old.name.clone(),
        ty: old.ty.substitute(types),
        default_value: None,
        origin: old.origin,
        owner,
    };
    program.alloc_param(copy)
}

#[cfg(test)]
mod tests {
    use coro_ir::{Body, Call, ClassKind, ExprKind, IrBuilder, Parent, Span, ValueRef};

    use super::*;
    use crate::config::BuiltinNames;
    use crate::prelude::declare_prelude;

    struct Fixture {
        program: Program,
        builtins: Builtins,
        registry: MappingRegistry,
        report: LoweringReport,
    }

    fn fixture(build: impl FnOnce(&mut Program)) -> Fixture {
        let mut program = Program::new("unit");
        declare_prelude(&mut program, &BuiltinNames::default());
        build(&mut program);
        let builtins = Builtins::resolve(&program, &BuiltinNames::default()).unwrap();
        Fixture {
            program,
            builtins,
            registry: MappingRegistry::new(),
            report: LoweringReport::new("unit"),
        }
    }

    fn run(fx: &mut Fixture) {
        synthesize_stubs(&mut fx.program, &mut fx.registry, &fx.builtins, &mut fx.report).unwrap();
    }

    #[test]
    fn twin_appends_completion_and_suspender() {
        let mut original = None;
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let f = program.add_function("fetch", Parent::File(file), Type::Int);
            program.function_mut(f).is_suspend = true;
            program.add_param(f, "id", Type::Int);
            program.add_param(f, "name", Type::String);
            original = Some(f);
        });
        let original = original.unwrap();
        run(&mut fx);

        let twin = fx.registry.twin_of(original).unwrap();
        let f = fx.program.function(twin);
        assert!(!f.is_suspend);
        assert_eq!(f.params.len(), 4);
        let completion = fx.program.param(f.params[2]);
        let suspender = fx.program.param(f.params[3]);
        assert_eq!(completion.name, COMPLETION_PARAM);
        assert_eq!(completion.origin, ParamOrigin::Completion);
        assert_eq!(completion.ty, fx.builtins.completion_type(Type::Int));
        assert_eq!(suspender.origin, ParamOrigin::Suspender);
        assert_eq!(suspender.ty, fx.builtins.suspender_type());
        assert_eq!(fx.program.param(f.params[0]).name, "id");
        assert_eq!(fx.program.find_function("app.fetch"), Some(twin));
    }

    #[test]
    fn body_moves_with_params_and_returns_remapped() {
        let mut ids = None;
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let f = program.add_function("echo", Parent::File(file), Type::Int);
            program.function_mut(f).is_suspend = true;
            let x = program.add_param(f, "x", Type::Int);
            let mut b = IrBuilder::new(program, Span::synthetic());
            let get = b.get_param(x);
            let ret = b.ret(f, get);
            program.function_mut(f).body = Some(Body::Block(vec![ret]));
            ids = Some(f);
        });
        let original = ids.unwrap();
        run(&mut fx);

        let twin = fx.registry.twin_of(original).unwrap();
        assert!(fx.program.function(original).body.is_none());
        let exprs = fx.program.body_exprs(twin);
        let new_x = fx.program.function(twin).params[0];
        assert!(matches!(
            fx.program.expr(exprs[0]).kind,
            ExprKind::Return { target, .. } if target == twin
        ));
        assert_eq!(fx.program.expr(exprs[1]).kind, ExprKind::Get(ValueRef::Param(new_x)));
    }

    #[test]
    fn generic_signature_gets_fresh_type_params() {
        let mut ids = None;
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let f = program.add_function("identity", Parent::File(file), Type::Unit);
            program.function_mut(f).is_suspend = true;
            let t = program.add_type_param(TypeParamOwner::Function(f), "T");
            program.add_param(f, "value", Type::Param(t));
            program.function_mut(f).return_type = Type::Param(t);
            ids = Some((f, t));
        });
        let (original, old_t) = ids.unwrap();
        run(&mut fx);

        let twin = fx.registry.twin_of(original).unwrap();
        let f = fx.program.function(twin);
        assert_eq!(f.type_params.len(), 1);
        let new_t = f.type_params[0];
        assert_ne!(new_t, old_t);
        assert_eq!(f.return_type, Type::Param(new_t));
        assert_eq!(fx.program.param(f.params[0]).ty, Type::Param(new_t));
        assert_eq!(
            fx.program.param(f.params[1]).ty,
            fx.builtins.completion_type(Type::Param(new_t))
        );
    }

    #[test]
    fn overrides_point_at_twins_and_member_receivers_are_copied() {
        let mut ids = None;
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let base = program.add_class("Base", ClassKind::Interface, Parent::File(file));
            let derived = program.add_class("Derived", ClassKind::Class, Parent::File(file));
            program.class_mut(derived).supertypes = vec![Type::simple(base)];
            let base_load = program.add_function("load", Parent::Class(base), Type::Int);
            program.add_dispatch_receiver(base_load, Type::simple(base));
            program.function_mut(base_load).is_suspend = true;
            let derived_load = program.add_function("load", Parent::Class(derived), Type::Int);
            program.add_dispatch_receiver(derived_load, Type::simple(derived));
            program.function_mut(derived_load).is_suspend = true;
            program.function_mut(derived_load).overridden = vec![base_load];
            ids = Some((base_load, derived_load));
        });
        let (base_load, derived_load) = ids.unwrap();
        run(&mut fx);

        let base_twin = fx.registry.twin_of(base_load).unwrap();
        let derived_twin = fx.registry.twin_of(derived_load).unwrap();
        assert_eq!(fx.program.function(derived_twin).overridden, vec![base_twin]);
        let receiver = fx.program.function(derived_twin).dispatch_receiver.unwrap();
        assert_ne!(Some(receiver), fx.program.function(derived_load).dispatch_receiver);
        assert_eq!(fx.program.param(receiver).origin, ParamOrigin::DispatchReceiver);
        assert_eq!(fx.report.stats.stubs_created, fx.registry.len());
    }

    #[test]
    fn overridden_function_missing_from_its_class_is_fatal() {
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let base = program.add_class("Base", ClassKind::Interface, Parent::File(file));
            let derived = program.add_class("Derived", ClassKind::Class, Parent::File(file));
            let base_load = program.add_function("load", Parent::Class(base), Type::Int);
            program.function_mut(base_load).is_suspend = true;
            program.class_mut(base).declarations.clear();
            let derived_load = program.add_function("load", Parent::Class(derived), Type::Int);
            program.function_mut(derived_load).is_suspend = true;
            program.function_mut(derived_load).overridden = vec![base_load];
        });

        let err = synthesize_stubs(&mut fx.program, &mut fx.registry, &fx.builtins, &mut fx.report)
            .unwrap_err();
        assert_eq!(
            err,
            LowerError::UnlistedDeclaration {
                function: "app.Base.load".to_string(),
            }
        );
    }

    #[test]
    fn default_values_are_copied_and_remapped() {
        let mut ids = None;
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let f = program.add_function("greet", Parent::File(file), Type::Unit);
            program.function_mut(f).is_suspend = true;
            let first = program.add_param(f, "first", Type::String);
            let second = program.add_param(f, "second", Type::String);
            let mut b = IrBuilder::new(program, Span::synthetic());
            let default = b.get_param(first);
            program.param_mut(second).default_value = Some(default);
            ids = Some((f, default));
        });
        let (original, old_default) = ids.unwrap();
        run(&mut fx);

        let twin = fx.registry.twin_of(original).unwrap();
        let params = fx.program.function(twin).params.clone();
        let copied = fx.program.param(params[1]).default_value.unwrap();
        assert_ne!(copied, old_default);
        assert_eq!(fx.program.expr(copied).kind, ExprKind::Get(ValueRef::Param(params[0])));
    }

    #[test]
    fn local_functions_follow_the_body() {
        let mut ids = None;
        let mut fx = fixture(|program| {
            let file = program.add_file("app.kt", "app");
            let f = program.add_function("outer", Parent::File(file), Type::Int);
            program.function_mut(f).is_suspend = true;
            let x = program.add_param(f, "x", Type::Int);
            let local = program.add_function("inner", Parent::Function(f), Type::Int);
            let mut b = IrBuilder::new(program, Span::synthetic());
            let captured = b.get_param(x);
            let early = b.ret(f, captured);
            program.function_mut(local).body = Some(Body::Block(vec![early]));
            let mut b = IrBuilder::new(program, Span::synthetic());
            let decl = b.local_function(local);
            let call = b.call(Call::new(local, vec![]), Type::Int);
            let ret = b.ret(f, call);
            program.function_mut(f).body = Some(Body::Block(vec![decl, ret]));
            ids = Some((f, local));
        });
        let (original, local) = ids.unwrap();
        run(&mut fx);

        let twin = fx.registry.twin_of(original).unwrap();
        assert_eq!(fx.program.function(local).parent, Parent::Function(twin));
        let exprs = fx.program.body_exprs(local);
        let new_x = fx.program.function(twin).params[0];
        assert!(matches!(
            fx.program.expr(exprs[0]).kind,
            ExprKind::Return { target, .. } if target == twin
        ));
        assert_eq!(fx.program.expr(exprs[1]).kind, ExprKind::Get(ValueRef::Param(new_x)));
    }
}
