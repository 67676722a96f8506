//! Signal delivery into a supervised run.

use std::time::Duration;

use chisel_core::{LifecycleState, ShutdownContext, ShutdownOutcome, Signal};
use chisel_test::{CloseBehavior, EngineEvent, ScriptedEngine, SupervisorHarness};

#[tokio::test]
async fn repeated_signals_close_once() {
    let engine = ScriptedEngine::new().with_close(CloseBehavior::Delay(Duration::from_millis(100)));
    let calls = engine.calls();
    let mut running = SupervisorHarness::server(engine).launch();

    running
        .wait_for(LifecycleState::Active, Duration::from_secs(1))
        .await
        .unwrap();
    running.interrupt().await.unwrap();
    running.interrupt().await.unwrap();
    running.terminate().await.unwrap();

    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
    assert_eq!(calls.count(EngineEvent::CloseEntered), 1);
}

#[tokio::test]
async fn second_signal_during_close_is_absorbed() {
    let engine = ScriptedEngine::new().with_close(CloseBehavior::Delay(Duration::from_millis(100)));
    let calls = engine.calls();
    let mut running = SupervisorHarness::client(engine).launch();

    running.interrupt().await.unwrap();
    running
        .wait_for(LifecycleState::ShutdownRequested, Duration::from_secs(1))
        .await
        .unwrap();
    running.signal(Signal::Int).await.unwrap();

    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
    assert_eq!(calls.count(EngineEvent::CloseEntered), 1);
}

#[tokio::test(start_paused = true)]
async fn signal_before_construction_still_closes() {
    let engine = ScriptedEngine::new();
    let calls = engine.calls();
    let running = SupervisorHarness::server(engine)
        .with_construct_delay(Duration::from_secs(3))
        .launch();

    running.terminate().await.unwrap();
    tokio::task::yield_now().await;
    assert!(running.shutdown().is_cancelled());
    assert_eq!(running.state(), None);

    assert_eq!(running.finish().await.unwrap(), ShutdownOutcome::Graceful);
    assert_eq!(calls.count(EngineEvent::CloseEntered), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_triggers_transition_once() {
    let ctx = ShutdownContext::new();
    let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(8));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                ctx.trigger()
            })
        })
        .collect();

    let mut transitions = 0;
    for task in tasks {
        if task.await.unwrap() {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn os_sigint_reaches_orchestrator() {
    use chisel_core::{Mode, Orchestrator, OsSignals, spawn_interrupt_handler};
    use nix::sys::signal::{Signal as NixSignal, kill};
    use nix::unistd::Pid;

    let shutdown = ShutdownContext::new();
    let handler = spawn_interrupt_handler(OsSignals::register().unwrap(), shutdown.clone());
    let engine = ScriptedEngine::new();
    let calls = engine.calls();
    let run = tokio::spawn(Orchestrator::new(Mode::Server, engine, shutdown).run());

    tokio::time::sleep(Duration::from_millis(20)).await;
    kill(Pid::this(), NixSignal::SIGINT).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("SIGINT should end the run")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ShutdownOutcome::Graceful);
    assert_eq!(calls.count(EngineEvent::CloseEntered), 1);
    handler.abort();
}
