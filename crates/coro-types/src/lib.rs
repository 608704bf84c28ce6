//! Semantic types for the coroutine lowering pipeline.
//!
//! Types here are the resolved types produced by the upstream checker. Classes
//! and type parameters are referenced by id; their names and declarations live
//! in the IR arena (`coro-ir`), which implements [`TypeNames`] for rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identity of a class (or interface / object) declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Identity of a type parameter declared on a function or class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeParamId(pub u32);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Bool,
    Int,
    String,
    /// Non-null top type.
    Any,
    /// Nullable top type (`Any?`), the static type of untyped suspend results.
    NullableAny,
    /// Bottom type, the type of `return` and `throw`.
    Nothing,
    Throwable,
    /// Opaque struct reference used at the virtual-machine boundary.
    StructRef,
    /// Instance of a declared class, possibly generic.
    Class(ClassType),
    /// Reference to a declared type parameter.
    Param(TypeParamId),
}

/// A class type application such as `Continuation<Int>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub class: ClassId,
    pub args: Vec<Type>,
    pub nullable: bool,
}

/// Mapping from type parameters to the types that replace them.
pub type TypeSubstitution = BTreeMap<TypeParamId, Type>;

impl Type {
    /// Non-null application of `class` to `args`.
    pub fn class(class: ClassId, args: Vec<Type>) -> Self {
        Type::Class(ClassType {
            class,
            args,
            nullable: false,
        })
    }

    /// Non-null, non-generic instance of `class`.
    pub fn simple(class: ClassId) -> Self {
        Self::class(class, Vec::new())
    }

    /// The class this type is an instance of, if any.
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            Type::Class(ct) => Some(ct.class),
            _ => None,
        }
    }

    pub fn class_args(&self) -> &[Type] {
        match self {
            Type::Class(ct) => &ct.args,
            _ => &[],
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Type::NullableAny => true,
            Type::Class(ct) => ct.nullable,
            _ => false,
        }
    }

    pub fn make_nullable(self) -> Self {
        match self {
            Type::Any => Type::NullableAny,
            Type::Class(mut ct) => {
                ct.nullable = true;
                Type::Class(ct)
            }
            other => other,
        }
    }

    /// Replace every type parameter bound in `subst`. Unbound parameters are
    /// left untouched.
    pub fn substitute(&self, subst: &TypeSubstitution) -> Type {
        if subst.is_empty() {
            return self.clone();
        }
        match self {
            Type::Param(id) => subst.get(id).cloned().unwrap_or(Type::Param(*id)),
            Type::Class(ct) => Type::Class(ClassType {
                class: ct.class,
                args: ct.args.iter().map(|arg| arg.substitute(subst)).collect(),
                nullable: ct.nullable,
            }),
            other => other.clone(),
        }
    }

    /// Type parameters mentioned anywhere in this type.
    pub fn free_type_params(&self) -> BTreeSet<TypeParamId> {
        let mut out = BTreeSet::new();
        self.collect_type_params(&mut out);
        out
    }

    fn collect_type_params(&self, out: &mut BTreeSet<TypeParamId>) {
        match self {
            Type::Param(id) => {
                out.insert(*id);
            }
            Type::Class(ct) => {
                for arg in &ct.args {
                    arg.collect_type_params(out);
                }
            }
            _ => {}
        }
    }

    /// Render with declaration names supplied by `names`.
    pub fn display<'a>(&'a self, names: &'a dyn TypeNames) -> NamedType<'a> {
        NamedType { ty: self, names }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Name lookup for ids appearing inside types.
pub trait TypeNames {
    fn class_name(&self, class: ClassId) -> &str;
    fn type_param_name(&self, param: TypeParamId) -> &str;
}

/// A type paired with the names needed to print it.
pub struct NamedType<'a> {
    ty: &'a Type,
    names: &'a dyn TypeNames,
}

impl fmt::Display for NamedType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(
            f,
            self.ty,
            &|f, class| write!(f, "{}", self.names.class_name(class)),
            &|f, param| write!(f, "{}", self.names.type_param_name(param)),
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(
            f,
            self,
            &|f, class| write!(f, "class#{}", class.0),
            &|f, param| write!(f, "T#{}", param.0),
        )
    }
}

type NameWriter<'a, Id> = &'a dyn Fn(&mut fmt::Formatter<'_>, Id) -> fmt::Result;

fn write_type(
    f: &mut fmt::Formatter<'_>,
    ty: &Type,
    class_name: NameWriter<'_, ClassId>,
    param_name: NameWriter<'_, TypeParamId>,
) -> fmt::Result {
    match ty {
        Type::Unit => write!(f, "Unit"),
        Type::Bool => write!(f, "Bool"),
        Type::Int => write!(f, "Int"),
        Type::String => write!(f, "String"),
        Type::Any => write!(f, "Any"),
        Type::NullableAny => write!(f, "Any?"),
        Type::Nothing => write!(f, "Nothing"),
        Type::Throwable => write!(f, "Throwable"),
        Type::StructRef => write!(f, "structref"),
        Type::Param(id) => param_name(f, *id),
        Type::Class(ct) => {
            class_name(f, ct.class)?;
            if !ct.args.is_empty() {
                write!(f, "<")?;
                for (i, arg) in ct.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_type(f, arg, class_name, param_name)?;
                }
                write!(f, ">")?;
            }
            if ct.nullable {
                write!(f, "?")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Names;

    impl TypeNames for Names {
        fn class_name(&self, class: ClassId) -> &str {
            match class.0 {
                0 => "Continuation",
                _ => "Result",
            }
        }

        fn type_param_name(&self, _param: TypeParamId) -> &str {
            "T"
        }
    }

    #[test]
    fn substitute_replaces_nested_params() {
        let t = TypeParamId(0);
        let ty = Type::class(ClassId(0), vec![Type::class(ClassId(1), vec![Type::Param(t)])]);
        let subst = TypeSubstitution::from([(t, Type::Int)]);
        assert_eq!(
            ty.substitute(&subst),
            Type::class(ClassId(0), vec![Type::class(ClassId(1), vec![Type::Int])])
        );
    }

    #[test]
    fn substitute_leaves_unbound_params() {
        let ty = Type::Param(TypeParamId(3));
        let subst = TypeSubstitution::from([(TypeParamId(0), Type::Int)]);
        assert_eq!(ty.substitute(&subst), ty);
    }

    #[test]
    fn free_type_params_collects_all() {
        let ty = Type::class(
            ClassId(0),
            vec![Type::Param(TypeParamId(2)), Type::Param(TypeParamId(1))],
        );
        let params: Vec<_> = ty.free_type_params().into_iter().collect();
        assert_eq!(params, vec![TypeParamId(1), TypeParamId(2)]);
    }

    #[test]
    fn named_display() {
        let ty = Type::class(ClassId(0), vec![Type::Param(TypeParamId(0))]).make_nullable();
        assert_eq!(ty.display(&Names).to_string(), "Continuation<T>?");
        assert_eq!(Type::NullableAny.to_string(), "Any?");
        assert_eq!(Type::simple(ClassId(4)).to_string(), "class#4");
    }
}
