//! The `run` subcommand: fan the workload out and print the merged summary.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use bench_core::{
    format_summary, parse_weighted_spec, split, ConnectionConfig, ExecutionMode, FailurePolicy,
    MetricsCollector, ScriptCatalog, ScriptSource, Summary, WorkerReport, WorkerTask,
    DEFAULT_BUILTIN,
};
use tracing::info;

use super::parallel::run_processes;
use super::worker::run_in_process;

/// Everything `run` needs besides the connection.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub scale: i64,
    pub processes: usize,
    pub jobs: usize,
    pub transactions: u64,
    pub preheat: u64,
    pub mode: ExecutionMode,
    pub failure_policy: FailurePolicy,
    pub settle_delay: Duration,
    pub scripts: Vec<ScriptSource>,
}

/// Turn `--file` and `--builtin` specs into script sources.
///
/// Built-ins come first. Without any spec the default built-in is used.
pub fn build_script_sources(
    files: &[String],
    builtins: &[String],
) -> anyhow::Result<Vec<ScriptSource>> {
    let mut sources = Vec::new();

    if files.is_empty() && builtins.is_empty() {
        sources.push(ScriptSource::builtin(DEFAULT_BUILTIN, 1.0)?);
    }

    for spec in builtins {
        let (name, weight) = parse_weighted_spec(spec)?;
        sources.push(ScriptSource::builtin(&name, weight)?);
    }

    for spec in files {
        let (path, weight) = parse_weighted_spec(spec)?;
        sources.push(load_script_file(Path::new(&path), weight)?);
    }

    Ok(sources)
}

fn load_script_file(path: &Path, weight: f64) -> anyhow::Result<ScriptSource> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Error reading file {}", path.display()))?;
    Ok(ScriptSource {
        identity: path.display().to_string(),
        content,
        weight,
    })
}

/// Split the run into one task per process.
pub fn plan_tasks(connection: &ConnectionConfig, plan: &RunPlan) -> anyhow::Result<Vec<WorkerTask>> {
    if plan.scale < 1 {
        anyhow::bail!("--scale must be at least 1, got {}", plan.scale);
    }
    if plan.jobs == 0 {
        anyhow::bail!("--jobs must be at least 1");
    }

    let ranges = split(1, plan.scale, plan.processes)?;
    Ok(ranges
        .into_iter()
        .enumerate()
        .map(|(i, range)| WorkerTask {
            process_id: i + 1,
            connection: connection.clone(),
            range,
            scale: plan.scale,
            jobs: plan.jobs,
            transactions: plan.transactions,
            preheat: plan.preheat,
            mode: plan.mode,
            failure_policy: plan.failure_policy,
            settle_delay: plan.settle_delay,
            scripts: plan.scripts.clone(),
        })
        .collect())
}

/// Merge worker reports, failing on the first fatal error.
pub fn merge_reports(reports: Vec<WorkerReport>) -> anyhow::Result<MetricsCollector> {
    let fatal: Vec<String> = reports
        .iter()
        .filter_map(|r| {
            r.fatal_error
                .as_ref()
                .map(|e| format!("process {}: {}", r.process_id, e))
        })
        .collect();
    if !fatal.is_empty() {
        anyhow::bail!("{}", fatal.join("; "));
    }

    Ok(MetricsCollector::merge_all(reports.into_iter().map(|r| r.metrics)).unwrap_or_default())
}

/// Run the workload and print the summary to stdout.
pub async fn run_benchmark(connection: &ConnectionConfig, plan: RunPlan) -> anyhow::Result<Summary> {
    // Fail on bad scripts before any process is started
    let catalog = ScriptCatalog::from_sources(&plan.scripts, &connection.table_folder)?;
    for script in catalog.scripts() {
        info!(
            "Loaded script: {} (weight: {})",
            script.identity(),
            script.weight()
        );
    }
    info!("Total weight: {}", catalog.total_weight());

    let preheat_info = if plan.preheat > 0 {
        format!(", preheat={}", plan.preheat)
    } else {
        String::new()
    };
    info!(
        "Running workload with prefix_path={}, scale={}, jobs={}, transactions={}{}, client={}, mode={}",
        connection.table_folder,
        plan.scale,
        plan.jobs,
        plan.transactions,
        preheat_info,
        plan.processes,
        plan.mode
    );

    let mut tasks = plan_tasks(connection, &plan)?;
    let reports = if tasks.len() == 1 {
        let task = tasks.remove(0);
        vec![run_in_process(&task).await]
    } else {
        run_processes(tasks).await
    };

    let metrics = merge_reports(reports)?;
    let summary = metrics.summary();
    println!("{}", format_summary(&summary));

    if !summary.unhandled_errors.is_empty() {
        anyhow::bail!(
            "Workload finished with {} unhandled error(s)",
            summary.unhandled_errors.len()
        );
    }
    info!("Workload completed");
    Ok(summary)
}
