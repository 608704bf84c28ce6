//! Driver that runs the lowering over whole compilation units.

use coro_diag::DiagnosticError;
use coro_ir::Program;

use crate::body::{BodyContext, BodyLowering, run_body_pass};
use crate::builtins::Builtins;
use crate::call_sites::CallSiteRewrite;
use crate::config::{BodyPass, LoweringConfig};
use crate::error::LowerError;
use crate::exports::ExportTrampolines;
use crate::registry::MappingRegistry;
use crate::report::LoweringReport;
use crate::resume::ResumeCallRewrite;
use crate::stubs::synthesize_stubs;
use crate::suspend_intrinsic::SuspendIntrinsicExpansion;
use crate::verify::verify;

/// What lowering one unit produced besides the rewritten program.
#[derive(Debug, Clone)]
pub struct LoweredUnit {
    pub builtins: Builtins,
    pub registry: MappingRegistry,
    pub report: LoweringReport,
}

pub fn body_pass(pass: BodyPass) -> Box<dyn BodyLowering> {
    match pass {
        BodyPass::CallSites => Box::new(CallSiteRewrite),
        BodyPass::ResumeCalls => Box::new(ResumeCallRewrite),
        BodyPass::SuspendIntrinsic => Box::new(SuspendIntrinsicExpansion),
    }
}

/// Lower one compilation unit in place.
///
/// Builtins are resolved before any declaration is replaced, stubs are
/// synthesized, the body passes run in the configured order, then export
/// trampolines are generated and the result verified. On error `program`
/// may be partially rewritten; [`lower_units`] discards such units.
pub fn lower_program(program: &mut Program, config: &LoweringConfig) -> Result<LoweredUnit, LowerError> {
    config.validate()?;
    let builtins = Builtins::resolve(program, &config.builtins)?;
    let mut registry = MappingRegistry::new();
    let mut report = LoweringReport::new(program.name.clone());

    synthesize_stubs(program, &mut registry, &builtins, &mut report)?;

    let mut cx = BodyContext {
        program: &mut *program,
        registry: &registry,
        builtins: &builtins,
        config,
        report: &mut report,
    };
    for pass in &config.body_pass_order {
        run_body_pass(&mut cx, body_pass(*pass).as_mut())?;
    }

    if config.generate_export_trampolines {
        ExportTrampolines::new(&builtins).run(program, &mut report)?;
    }

    if config.verify
        && let Err(errors) = verify(program, &registry)
    {
        for err in &errors {
            tracing::error!(target: "coro_lower", unit = %program.name, %err, "lowered program failed verification");
        }
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
    }

    let stats = &report.stats;
    tracing::info!(
        target: "coro_lower",
        unit = %program.name,
        stubs = stats.stubs_created,
        calls = stats.calls_rewritten,
        resumes = stats.resumes_rewritten,
        intrinsics = stats.intrinsics_expanded,
        trampolines = stats.trampolines_generated,
        "lowered unit"
    );
    Ok(LoweredUnit {
        builtins,
        registry,
        report,
    })
}

/// Lower several units independently. A unit that fails is left as it was
/// and reported as diagnostics; the others are still lowered.
pub fn lower_units(
    units: &mut [Program],
    config: &LoweringConfig,
) -> Vec<Result<LoweredUnit, DiagnosticError>> {
    units
        .iter_mut()
        .map(|unit| {
            let mut scratch = unit.clone();
            match lower_program(&mut scratch, config) {
                Ok(lowered) => {
                    *unit = scratch;
                    Ok(lowered)
                }
                Err(err) => {
                    tracing::warn!(target: "coro_lower", unit = %unit.name, %err, "unit left unlowered");
                    Err(DiagnosticError::single(err.to_diagnostic().in_unit(&unit.name)))
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use coro_ir::{Body, Call, IrBuilder, Parent, Span};
    use coro_types::Type;

    use super::*;
    use crate::config::BuiltinNames;
    use crate::prelude::declare_prelude;

    fn unit(name: &str) -> Program {
        let mut program = Program::new(name);
        declare_prelude(&mut program, &BuiltinNames::default());
        let file = program.add_file("app.kt", "app");
        let leaf = program.add_function("leaf", Parent::File(file), Type::Int);
        program.function_mut(leaf).is_suspend = true;
        let root = program.add_function("root", Parent::File(file), Type::Int);
        program.function_mut(root).is_suspend = true;
        let mut b = IrBuilder::new(&mut program, Span::synthetic());
        let call = b.call(Call::new(leaf, vec![]), Type::Int);
        program.function_mut(root).body = Some(Body::Expression(call));
        program
    }

    #[test]
    fn lowers_and_verifies() {
        let mut program = unit("ok");
        let lowered = lower_program(&mut program, &LoweringConfig::default()).unwrap();
        // Two user functions, the suspend intrinsic and three exports.
        assert_eq!(lowered.registry.len(), 6);
        assert_eq!(lowered.report.stats.stubs_created, 6);
        assert_eq!(lowered.report.stats.calls_rewritten, 1);
        assert_eq!(lowered.report.stats.trampolines_generated, 3);
        assert!(program.declared_functions().iter().all(|f| !program.function(*f).is_suspend));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut program = unit("bad");
        let config = LoweringConfig {
            body_pass_order: vec![BodyPass::CallSites],
            ..LoweringConfig::default()
        };
        let before = program.clone();
        assert!(matches!(
            lower_program(&mut program, &config),
            Err(LowerError::InvalidConfig { .. })
        ));
        assert_eq!(program, before);
    }

    #[test]
    fn failing_unit_is_isolated() {
        let mut broken = Program::new("broken");
        let file = broken.add_file("app.kt", "app");
        broken.add_function("lonely", Parent::File(file), Type::Unit);
        let mut units = vec![unit("first"), broken.clone(), unit("third")];

        let results = lower_units(&mut units, &LoweringConfig::default());
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.diagnostics().len(), 1);
        assert!(err.diagnostics()[0].to_string().starts_with("error[L0002]"));
        assert_eq!(units[1], broken);
    }
}
