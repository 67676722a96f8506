//! Start, close and timeout behavior of a supervised run.

use std::time::Duration;

use chisel_core::{CLOSE_TIMEOUT, ChiselError, LifecycleState, ShutdownOutcome};
use chisel_test::{
    CloseBehavior, EngineEvent, ScriptedEngine, StartBehavior, SupervisorHarness, TestError,
};

#[tokio::test]
async fn engine_not_closed_without_signal() {
    let engine = ScriptedEngine::new();
    let calls = engine.calls();
    let mut running = SupervisorHarness::server(engine).launch();

    running
        .wait_for(LifecycleState::Active, Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!calls.close_called());
    assert_eq!(running.state(), Some(LifecycleState::Active));
    assert!(!running.shutdown().is_cancelled());

    running.interrupt().await.unwrap();
    running.finish().await.unwrap();
}

#[tokio::test]
async fn states_progress_to_closed() {
    let engine = ScriptedEngine::new().with_close(CloseBehavior::Delay(Duration::from_millis(50)));
    let mut running = SupervisorHarness::client(engine).launch();

    running
        .wait_for(LifecycleState::Active, Duration::from_secs(1))
        .await
        .unwrap();
    running.terminate().await.unwrap();
    running
        .wait_for(LifecycleState::ShutdownRequested, Duration::from_secs(1))
        .await
        .unwrap();
    running
        .wait_for(LifecycleState::Closed, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test(start_paused = true)]
async fn hanging_close_exits_cleanly_after_timeout() {
    let engine = ScriptedEngine::new().with_close(CloseBehavior::Hang);
    let calls = engine.calls();
    let running = SupervisorHarness::server(engine).launch();

    let begun = tokio::time::Instant::now();
    running.interrupt().await.unwrap();
    let outcome = running.finish().await.unwrap();

    assert_eq!(outcome, ShutdownOutcome::TimedOut);
    assert!(begun.elapsed() >= CLOSE_TIMEOUT);
    assert_eq!(calls.count(EngineEvent::CloseEntered), 1);
    assert_eq!(calls.count(EngineEvent::CloseReturned), 0);
}

#[tokio::test(start_paused = true)]
async fn close_just_inside_timeout_is_graceful() {
    let engine = ScriptedEngine::new()
        .with_close(CloseBehavior::Delay(CLOSE_TIMEOUT - Duration::from_millis(1)));
    let running = SupervisorHarness::server(engine).launch();
    running.interrupt().await.unwrap();
    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn close_error_is_not_fatal() {
    let engine = ScriptedEngine::new().with_close(CloseBehavior::Fail("listener busy".into()));
    let running = SupervisorHarness::server(engine).launch();
    running.interrupt().await.unwrap();
    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test(start_paused = true)]
async fn start_failure_is_fatal_without_signal() {
    let engine = ScriptedEngine::new().with_start(StartBehavior::FailAfter(
        Duration::from_secs(1),
        "address already in use".into(),
    ));
    let calls = engine.calls();
    let running = SupervisorHarness::server(engine).launch();

    let err = running.finish().await.unwrap_err();
    match err {
        TestError::Chisel(ChiselError::EngineStart(msg)) => {
            assert!(msg.contains("address already in use"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!calls.close_called());
}

#[tokio::test(start_paused = true)]
async fn start_failure_during_slow_close_is_fatal() {
    let engine = ScriptedEngine::new()
        .with_start(StartBehavior::FailAfter(
            Duration::from_secs(2),
            "tunnel broke".into(),
        ))
        .with_close(CloseBehavior::Hang);
    let running = SupervisorHarness::client(engine).launch();
    running.interrupt().await.unwrap();

    let err = running.finish().await.unwrap_err();
    assert!(err.to_string().contains("tunnel broke"));
}

#[tokio::test]
async fn start_returning_ok_waits_for_signal() {
    let engine = ScriptedEngine::new().with_start(StartBehavior::ReturnImmediately);
    let calls = engine.calls();
    let mut running = SupervisorHarness::server(engine).launch();

    running
        .wait_for(LifecycleState::Active, Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.count(EngineEvent::StartReturned), 1);
    assert_eq!(running.state(), Some(LifecycleState::Active));

    running.interrupt().await.unwrap();
    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
    assert_eq!(calls.count(EngineEvent::CloseEntered), 1);
}
