use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cronduct::logging::init_logging;
use cronduct::*;
use tokio_util::sync::CancellationToken;

// A pipeline stage that pretends to move rows around
struct Stage {
    name: &'static str,
    work: Duration,
}

#[async_trait]
impl Action for Stage {
    async fn execute(&self, ctx: CancellationToken, input: &TaskInput) -> Result<TaskResult, BoxError> {
        let attempt = input.get("attempt").and_then(|v| v.as_u64()).unwrap_or(1);
        tracing::info!(stage = self.name, attempt, "stage running");

        tokio::select! {
            _ = ctx.cancelled() => return Err("stage interrupted".into()),
            _ = tokio::time::sleep(self.work) => {}
        }

        let mut result = HashMap::new();
        result.insert("stage".to_string(), serde_json::json!(self.name));
        result.insert("finished_at".to_string(), serde_json::json!(chrono::Utc::now().to_rfc3339()));
        Ok(result)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(None)?;

    let orch = Orchestrator::new(OrchestratorConfig {
        max_workers: 4,
        shutdown_grace_period: Duration::from_secs(10),
        ..Default::default()
    })?;

    orch.register(
        Task::builder("extract", Stage { name: "extract", work: Duration::from_millis(300) })
            .trigger(TriggerSpec::Interval { every: Duration::from_secs(5), immediate: true })
            .timeout(Duration::from_secs(2))
            .retry_delay(Duration::from_secs(1))
            .build()?,
    )
    .await?;

    orch.register(
        Task::builder("transform", Stage { name: "transform", work: Duration::from_millis(200) })
            .trigger(TriggerSpec::Interval { every: Duration::from_secs(5), immediate: false })
            .depends_on("extract")
            .on_failure(|err| {
                tracing::error!(%err, "transform gave up");
                Ok(())
            })
            .build()?,
    )
    .await?;

    let loaded = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let counter = Arc::clone(&loaded);
    orch.register(
        Task::builder("load", Stage { name: "load", work: Duration::from_millis(100) })
            .trigger(TriggerSpec::every(Duration::from_secs(5)))
            .depends_on("transform")
            // only load during the first minute of the demo
            .condition(move || counter.load(std::sync::atomic::Ordering::Relaxed) < 12)
            .on_success(move |_| {
                loaded.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            })
            .build()?,
    )
    .await?;

    println!("=== pipeline ===");
    print!("{}", orch.render_graph().await);

    let reporter = orch.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(15));
        ticker.tick().await;
        while reporter.is_running() {
            ticker.tick().await;
            let metrics = reporter.get_all_metrics().await;
            match serde_json::to_string_pretty(&metrics.global) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "could not render metrics"),
            }
        }
    });

    // runs until Ctrl-C or SIGTERM
    orch.start(true).await?;

    let metrics = orch.get_all_metrics().await;
    println!("=== final metrics ===");
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
