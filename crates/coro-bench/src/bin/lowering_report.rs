use std::path::PathBuf;

use coro_bench::{Workload, call_chain, fan_out};
use coro_lower::{LoweringConfig, PassStats, lower_program};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config = LoweringConfig::default();
    let workloads = vec![
        ("chain_16", call_chain(16)),
        ("chain_256", call_chain(256)),
        ("fan_out_16", fan_out(16)),
        ("fan_out_256", fan_out(256)),
    ];
    let mut entries = Vec::with_capacity(workloads.len());
    let mut total = PassStats::default();
    for (name, workload) in workloads {
        let stats = lower_workload(name, workload, &config)?;
        total.stubs_created += stats.stubs_created;
        total.calls_rewritten += stats.calls_rewritten;
        total.resumes_rewritten += stats.resumes_rewritten;
        total.intrinsics_expanded += stats.intrinsics_expanded;
        total.trampolines_generated += stats.trampolines_generated;
        total.bodies_visited += stats.bodies_visited;
        entries.push(serde_json::json!({ "name": name, "stats": stats }));
    }
    let json = serde_json::to_string_pretty(&serde_json::json!({
        "workloads": entries,
        "total": total,
    }))
    .map_err(|err| format!("failed to render report: {err}"))?;

    if let Some(path) = std::env::args().nth(1) {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create `{}`: {err}", parent.display()))?;
        }
        std::fs::write(&path, json)
            .map_err(|err| format!("failed to write `{}`: {err}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn lower_workload(
    name: &'static str,
    mut workload: Workload,
    config: &LoweringConfig,
) -> Result<PassStats, String> {
    let unit = lower_program(&mut workload.program, config)
        .map_err(|err| format!("failed to lower workload `{name}`: {err}"))?;
    Ok(unit.report.stats)
}
