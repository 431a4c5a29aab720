use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wftrace::{
    CrosstermSize, ExecutionTemplate, FileHistorySource, TermWriter, TraceConfig, WorkflowTracer,
    get_workflow_execution_updates,
};

/// Trace `workflow_id` until it closes or the user interrupts.
/// Returns the exit code for the root workflow's final status.
pub fn run(config: &TraceConfig, workflow_id: &str, run_id: &str) -> Result<i32> {
    if config.trace.update_period_ms == 0 {
        anyhow::bail!("Update period must be at least 1 ms");
    }
    if !config.history.dir.is_dir() {
        anyhow::bail!("History directory '{}' does not exist", config.history.dir.display());
    }

    let options = config.update_options()?;
    let template = ExecutionTemplate::new(options.fold_status.clone(), config.trace.no_fold);
    let source = Arc::new(
        FileHistorySource::new(&config.history.dir)
            .with_poll_interval(Duration::from_millis(config.history.poll_interval_ms)),
    );
    let writer = TermWriter::new()
        .with_terminal_size(&CrosstermSize)
        .context("Failed to initialize terminal writer")?;
    let update_period = Duration::from_millis(config.trace.update_period_ms);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;

    rt.block_on(async {
        let cancel = CancellationToken::new();
        let updates = get_workflow_execution_updates(&cancel, source, workflow_id, run_id, options)?;

        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Warning: cannot listen for interrupts: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let mut tracer = WorkflowTracer::new(writer, template, update_period);
        let code = tracer.run(updates, interrupt).await;
        cancel.cancel();
        Ok::<i32, anyhow::Error>(code?)
    })
}
