//! Original-to-stub mapping for one compilation unit.

use std::collections::BTreeMap;

use coro_ir::{FunctionId, Program};

use crate::error::LowerError;

/// Builds twins on behalf of [`MappingRegistry::get_or_create`].
///
/// Creation is split in two so the registry can record the mapping between
/// the phases: populating a twin may ask for twins of other functions
/// (overridden declarations), and those requests can lead back to the
/// function being populated.
pub trait TwinFactory {
    /// Allocate an empty twin for `original`.
    fn create_shell(&mut self, program: &mut Program, original: FunctionId)
    -> Result<FunctionId, LowerError>;

    /// Fill in signature and body of a twin that is already registered.
    fn populate(
        &mut self,
        program: &mut Program,
        registry: &mut MappingRegistry,
        original: FunctionId,
        twin: FunctionId,
    ) -> Result<(), LowerError>;
}

/// Bijection between suspend functions and their stubs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRegistry {
    forward: BTreeMap<FunctionId, FunctionId>,
    inverse: BTreeMap<FunctionId, FunctionId>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn twin_of(&self, original: FunctionId) -> Option<FunctionId> {
        self.forward.get(&original).copied()
    }

    pub fn original_of(&self, twin: FunctionId) -> Option<FunctionId> {
        self.inverse.get(&twin).copied()
    }

    pub fn is_twin(&self, function: FunctionId) -> bool {
        self.inverse.contains_key(&function)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// `(original, twin)` pairs ordered by original.
    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, FunctionId)> + '_ {
        self.forward.iter().map(|(o, t)| (*o, *t))
    }

    /// Record `original -> twin`. Re-registering the same pair is a no-op;
    /// anything that would break the bijection is an error.
    pub fn register(&mut self, original: FunctionId, twin: FunctionId) -> Result<(), LowerError> {
        if let Some(existing) = self.twin_of(original)
            && existing != twin
        {
            return Err(LowerError::RegistryConflict {
                function: original.0,
                existing: existing.0,
            });
        }
        if let Some(existing) = self.original_of(twin)
            && existing != original
        {
            return Err(LowerError::RegistryConflict {
                function: twin.0,
                existing: existing.0,
            });
        }
        self.forward.insert(original, twin);
        self.inverse.insert(twin, original);
        Ok(())
    }

    /// Return the twin of `original`, creating it through `factory` if this
    /// is the first request.
    pub fn get_or_create(
        &mut self,
        program: &mut Program,
        original: FunctionId,
        factory: &mut dyn TwinFactory,
    ) -> Result<FunctionId, LowerError> {
        if let Some(twin) = self.twin_of(original) {
            return Ok(twin);
        }
        let twin = factory.create_shell(program, original)?;
        self.register(original, twin)?;
        factory.populate(program, self, original, twin)?;
        Ok(twin)
    }
}

#[cfg(test)]
mod tests {
    use coro_ir::Parent;
    use coro_types::Type;

    use super::*;

    /// Copies the function and, when populating, requests twins of every
    /// overridden function.
    #[derive(Default)]
    struct CountingFactory {
        shells: usize,
        populated: Vec<FunctionId>,
    }

    impl TwinFactory for CountingFactory {
        fn create_shell(
            &mut self,
            program: &mut Program,
            original: FunctionId,
        ) -> Result<FunctionId, LowerError> {
            self.shells += 1;
            let copy = program.function(original).clone();
            Ok(program.alloc_function(copy))
        }

        fn populate(
            &mut self,
            program: &mut Program,
            registry: &mut MappingRegistry,
            original: FunctionId,
            twin: FunctionId,
        ) -> Result<(), LowerError> {
            let overridden = program.function(original).overridden.clone();
            let mut twins = Vec::new();
            for o in overridden {
                twins.push(registry.get_or_create(program, o, self)?);
            }
            program.function_mut(twin).overridden = twins;
            self.populated.push(original);
            Ok(())
        }
    }

    fn two_functions() -> (Program, FunctionId, FunctionId) {
        let mut program = Program::new("unit");
        let file = program.add_file("a.kt", "app");
        let a = program.add_function("a", Parent::File(file), Type::Unit);
        let b = program.add_function("b", Parent::File(file), Type::Unit);
        (program, a, b)
    }

    #[test]
    fn get_or_create_is_memoized() {
        let (mut program, a, _) = two_functions();
        let mut registry = MappingRegistry::new();
        let mut factory = CountingFactory::default();

        let first = registry.get_or_create(&mut program, a, &mut factory).unwrap();
        let second = registry.get_or_create(&mut program, a, &mut factory).unwrap();

        assert_eq!(first, second);
        assert_eq!(factory.shells, 1);
        assert_eq!(registry.original_of(first), Some(a));
        assert!(registry.is_twin(first));
        assert!(!registry.is_twin(a));
    }

    #[test]
    fn override_cycle_terminates() {
        let (mut program, a, b) = two_functions();
        program.function_mut(a).overridden = vec![b];
        program.function_mut(b).overridden = vec![a];
        let mut registry = MappingRegistry::new();
        let mut factory = CountingFactory::default();

        let twin_a = registry.get_or_create(&mut program, a, &mut factory).unwrap();
        let twin_b = registry.twin_of(b).unwrap();

        assert_eq!(factory.shells, 2);
        assert_eq!(program.function(twin_a).overridden, vec![twin_b]);
        assert_eq!(program.function(twin_b).overridden, vec![twin_a]);
        assert_eq!(factory.populated, vec![b, a]);
    }

    #[test]
    fn register_rejects_second_twin() {
        let (_, a, b) = two_functions();
        let mut registry = MappingRegistry::new();
        registry.register(a, FunctionId(10)).unwrap();
        registry.register(a, FunctionId(10)).unwrap();

        assert_eq!(
            registry.register(a, FunctionId(11)),
            Err(LowerError::RegistryConflict {
                function: a.0,
                existing: 10
            })
        );
        assert!(matches!(
            registry.register(b, FunctionId(10)),
            Err(LowerError::RegistryConflict { .. })
        ));
        assert_eq!(registry.len(), 1);
    }
}
