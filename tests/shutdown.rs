mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{TestResult, eventually, init_tracing, quiet_config, recording_orchestrator, wait_for_state};
use cronduct::{
    BoxError, CronductError, ErrorKind, FnAction, OrchestratorConfig, Task, TaskEvent, TaskResult,
    TaskState,
};

#[tokio::test]
async fn shutdown_waits_for_running_attempts() -> TestResult {
    init_tracing();
    let (orch, _engine, sink) = recording_orchestrator(quiet_config());

    let finished = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&finished);
    let action = FnAction::new(move |_, _| {
        let f = Arc::clone(&f);
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            f.store(true, Ordering::SeqCst);
            Ok(TaskResult::new())
        }
    });

    orch.register(Task::builder("export", action).build()?).await?;
    orch.start(false).await?;
    orch.fire("export").await?;
    wait_for_state(&orch, "export", TaskState::Running).await;

    orch.shutdown(true).await;

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(orch.get_state("export").await?, TaskState::Success);
    assert!(!orch.is_running());
    assert!(sink.events().contains(&TaskEvent::ShutdownCompleted { abandoned: 0 }));
    assert!(matches!(orch.fire("export").await, Err(CronductError::ShutDown)));
    Ok(())
}

#[tokio::test]
async fn grace_period_expiry_cancels_attempts() -> TestResult {
    init_tracing();
    let config = OrchestratorConfig {
        shutdown_grace_period: Duration::from_millis(50),
        ..quiet_config()
    };
    let (orch, _engine, sink) = recording_orchestrator(config);

    // runs until told to stop
    let action = FnAction::new(|ctx, _| async move {
        ctx.cancelled().await;
        let res: Result<TaskResult, BoxError> = Err("interrupted".into());
        res
    });
    orch.register(Task::builder("stream", action).max_retries(0).build()?)
        .await?;
    orch.start(false).await?;
    orch.fire("stream").await?;
    wait_for_state(&orch, "stream", TaskState::Running).await;

    orch.shutdown(true).await;
    assert!(sink.events().contains(&TaskEvent::ShutdownCompleted { abandoned: 1 }));

    wait_for_state(&orch, "stream", TaskState::Failed).await;
    eventually(|| async {
        orch.get_metrics("stream")
            .await
            .is_some_and(|m| m.last_error == Some(ErrorKind::Cancelled))
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn blocking_start_returns_after_shutdown() -> TestResult {
    init_tracing();
    let (orch, _engine, sink) = recording_orchestrator(quiet_config());

    let runner = orch.clone();
    let handle = tokio::spawn(async move { runner.start(true).await });

    eventually(|| async { orch.is_running() }).await;
    orch.shutdown(true).await;

    let res = tokio::time::timeout(Duration::from_secs(5), handle).await??;
    assert!(res.is_ok());
    assert_eq!(
        sink.count(|e| matches!(e, TaskEvent::ShutdownStarted)),
        1
    );

    // a second shutdown is a no-op
    orch.shutdown(true).await;
    assert_eq!(
        sink.count(|e| matches!(e, TaskEvent::ShutdownStarted)),
        1
    );
    Ok(())
}

#[tokio::test]
async fn registration_after_shutdown_is_refused() -> TestResult {
    init_tracing();
    let (orch, _engine, _sink) = recording_orchestrator(quiet_config());
    orch.shutdown(false).await;

    let task = Task::builder("late", FnAction::new(|_, _| async { Ok(TaskResult::new()) })).build()?;
    assert!(matches!(
        orch.register(task).await,
        Err(CronductError::ShutDown)
    ));
    Ok(())
}
