//! Dispatch loop scenarios over in-process pipes

mod common;

use common::{attach, attach_with, engine, received};
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use termplex_core::core::transport::pipe;
use termplex_core::{shared, Direction, DispatchError, Outcome, Output, Stream};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_greet_quiet_answers_on_own_output() {
    let (mut engine, calls) = engine();
    let mut a = attach(&mut engine, "A", 0);

    a.write_all(b"greet -q\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    assert_eq!(processed.len(), 1);
    assert!(matches!(
        &processed[0].outcome,
        Outcome::Executed { command, destination, value, .. }
            if command == "greet" && destination == "A" && *value == Value::Bool(true)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(received(&mut a).await, "hi\n");
}

#[tokio::test]
async fn test_output_redirection_targets_other_stream() {
    let (mut engine, _) = engine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let mut a = attach_with(
        &mut engine,
        "A",
        move |session| {
            session.on_result(move |line: &str, value: &Value, out: &mut Output| {
                record
                    .lock()
                    .unwrap()
                    .push((line.to_string(), out.source().to_string(), out.destination().to_string()));
                out.println(format!("returned {value}"));
                Ok(())
            })
        },
        0,
    );
    let mut b = attach(&mut engine, "B", 0);

    a.write_all(b"greet -q >> B\n").await.unwrap();
    engine.poll_once().await.unwrap();

    assert_eq!(received(&mut b).await, "hi\nreturned true\n");
    assert_eq!(received(&mut a).await, "");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("greet -q >> B".to_string(), "A".to_string(), "B".to_string())]
    );
}

#[tokio::test]
async fn test_both_operators_never_invoke() {
    let (mut engine, calls) = engine();
    let mut a = attach(&mut engine, "A", 0);
    let _b = attach(&mut engine, "B", 0);

    a.write_all(b"greet << B >> A\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    assert!(matches!(
        processed[0].outcome,
        Outcome::Failed(DispatchError::MalformedRedirection(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(received(&mut a).await.starts_with("error: Malformed redirection"));
}

#[tokio::test]
async fn test_one_line_per_stream_per_iteration() {
    let (mut engine, calls) = engine();
    let mut a = attach(&mut engine, "A", 0);

    a.write_all(b"greet\ngreet\ngreet\n").await.unwrap();
    for expected in 1..=3 {
        let processed = engine.poll_once().await.unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), expected);
    }
    assert!(engine.poll_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ready_streams_are_processed_in_name_order() {
    let (mut engine, _) = engine();
    let mut b = attach(&mut engine, "B", 0);
    let mut a = attach(&mut engine, "A", 0);

    b.write_all(b"greet\n").await.unwrap();
    a.write_all(b"greet\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    let streams: Vec<&str> = processed.iter().map(|p| p.stream.as_str()).collect();
    assert_eq!(streams, ["A", "B"]);
}

#[tokio::test]
async fn test_exit_bypasses_registered_exit_command() {
    let (mut engine, calls) = engine();
    let counter = calls.clone();
    engine
        .commands_mut()
        .register("exit", 0, move |_: common::RestartArgs, _: &mut Output| {
            counter.fetch_add(100, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let mut a = attach(&mut engine, "A", 0);

    a.write_all(b"exit\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    assert_eq!(processed[0].outcome, Outcome::Exited { session: "A".into() });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(engine.sessions().is_empty());
    assert!(engine.streams().resolve("A").is_none());
    // Owned stream was shut down
    assert_eq!(received(&mut a).await, "");
}

#[tokio::test]
async fn test_permission_boundary() {
    let (mut engine, calls) = engine();
    let mut admin = attach(&mut engine, "admin", 5);
    let mut guest = attach(&mut engine, "guest", 4);

    admin.write_all(b"restart\n").await.unwrap();
    guest.write_all(b"restart\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    assert!(matches!(processed[0].outcome, Outcome::Executed { .. }));
    assert_eq!(
        processed[1].outcome,
        Outcome::Failed(DispatchError::PermissionDenied {
            command: "restart".into(),
            required: 5,
            level: 4,
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(received(&mut admin).await, "restarting\n");
    assert!(received(&mut guest).await.contains("Permission denied"));
}

#[tokio::test]
async fn test_restart_denied_without_side_effect() {
    let (mut engine, calls) = engine();
    let mut a = attach(&mut engine, "A", 0);

    a.write_all(b"restart\n").await.unwrap();
    engine.poll_once().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        received(&mut a).await,
        "error: Permission denied: 'restart' requires level 5, session has 0\n"
    );
}

#[tokio::test]
async fn test_input_redirection_runs_as_other_session() {
    let (mut engine, calls) = engine();
    let mut console = attach(&mut engine, "console", 0);
    let mut admin = attach(&mut engine, "admin", 5);

    console.write_all(b"restart << admin\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    assert!(matches!(
        &processed[0].outcome,
        Outcome::Executed { source, destination, .. } if source == "admin" && destination == "admin"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(received(&mut admin).await, "restarting\n");
    assert_eq!(received(&mut console).await, "");
}

#[tokio::test]
async fn test_exit_on_behalf_of_other_session() {
    let (mut engine, _) = engine();
    let mut console = attach(&mut engine, "console", 0);
    let _worker = attach(&mut engine, "worker", 0);

    console.write_all(b"exit << worker\n").await.unwrap();
    engine.poll_once().await.unwrap();

    assert!(engine.sessions().contains("console"));
    assert!(!engine.sessions().contains("worker"));
    assert_eq!(received(&mut console).await, "");
}

#[tokio::test]
async fn test_line_errors_keep_loop_running() {
    let (mut engine, calls) = engine();
    let mut a = attach(&mut engine, "A", 0);

    for line in [
        "nope\n",
        "greet >> nowhere\n",
        "greet << nobody\n",
        ">> A\n",
        "greet --loud\n",
        "greet \"unbalanced\n",
    ] {
        a.write_all(line.as_bytes()).await.unwrap();
    }

    let mut errors = Vec::new();
    for _ in 0..6 {
        for processed in engine.poll_once().await.unwrap() {
            if let Outcome::Failed(error) = processed.outcome {
                errors.push(error);
            }
        }
    }

    assert!(matches!(errors[0], DispatchError::UnknownCommand(ref name) if name == "nope"));
    assert!(matches!(
        errors[1],
        DispatchError::UnknownStream { direction: Direction::Out, .. }
    ));
    assert!(matches!(
        errors[2],
        DispatchError::UnknownStream { direction: Direction::In, .. }
    ));
    assert_eq!(errors[3], DispatchError::EmptyCommand);
    assert!(matches!(errors[4], DispatchError::ArgumentParse { .. }));
    assert!(matches!(errors[5], DispatchError::Tokenize(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    a.write_all(b"greet -q\n").await.unwrap();
    engine.poll_once().await.unwrap();
    assert!(received(&mut a).await.ends_with("hi\n"));
}

#[tokio::test]
async fn test_result_handler_failure_keeps_handler_output() {
    let (mut engine, calls) = engine();
    let mut a = attach_with(
        &mut engine,
        "A",
        |session| session.on_result(|_: &str, _: &Value, _: &mut Output| anyhow::bail!("sink full")),
        0,
    );

    a.write_all(b"greet -q\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();

    assert!(matches!(
        processed[0].outcome,
        Outcome::Failed(DispatchError::ResultHandler { ref message, .. }) if message == "sink full"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        received(&mut a).await,
        "hi\nerror: Result handler failed after 'greet': sink full\n"
    );
}

#[tokio::test]
async fn test_result_handler_panic_is_reported_and_loop_continues() {
    let (mut engine, calls) = engine();
    let mut a = attach_with(
        &mut engine,
        "A",
        |session| {
            session.on_result(|line: &str, _: &Value, _: &mut Output| {
                if line == "greet -q" {
                    panic!("printer jammed");
                }
                Ok(())
            })
        },
        0,
    );

    a.write_all(b"greet -q\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();
    assert!(matches!(
        processed[0].outcome,
        Outcome::Failed(DispatchError::ResultHandler { ref message, .. })
            if message == "result handler panicked: printer jammed"
    ));
    assert_eq!(
        received(&mut a).await,
        "hi\nerror: Result handler failed after 'greet': result handler panicked: printer jammed\n"
    );

    a.write_all(b"greet\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();
    assert!(matches!(processed[0].outcome, Outcome::Executed { .. }));
    assert_eq!(received(&mut a).await, "Hello there!\n");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_mount_unmount_round_trip_leaves_handle_open() {
    let (mut engine, _) = engine();
    let (stream, mut peer) = pipe::pair("log", 256);
    let handle = shared(stream);

    engine.mount("log", handle.clone(), Direction::Out).unwrap();
    assert!(matches!(engine.streams().resolve("log"), Some((_, Direction::Out))));
    assert!(engine.mount("log", handle.clone(), Direction::Out).is_err());

    let removed = engine.unmount("log").unwrap();
    assert!(removed.output.is_some());
    assert!(engine.streams().resolve("log").is_none());

    let mut stream = handle.lock().await;
    assert!(!stream.is_closed());
    stream.write_all(b"still open\n").await.unwrap();
    drop(stream);
    assert_eq!(received(&mut peer).await, "still open\n");
}

#[tokio::test]
async fn test_redirect_to_bare_output() {
    let (mut engine, _) = engine();
    let (log, mut log_peer) = pipe::pair("log", 256);
    engine.mount("log", shared(log), Direction::Out).unwrap();
    let mut a = attach(&mut engine, "A", 0);

    a.write_all(b"greet > log\n").await.unwrap();
    engine.poll_once().await.unwrap();

    assert_eq!(received(&mut log_peer).await, "hi\n");
    assert_eq!(received(&mut a).await, "");
}

#[tokio::test]
async fn test_shared_output_survives_first_session_closing() {
    let (mut engine, _) = engine();
    let (console, mut console_peer) = pipe::pair("console", 1024);
    let console = shared(console);
    let (a_stream, mut a) = pipe::pair("A", 256);
    let (b_stream, mut b) = pipe::pair("B", 256);

    engine
        .register_session(termplex_core::Session::new("A", shared(a_stream), "console", console.clone(), 0))
        .unwrap();
    engine
        .register_session(termplex_core::Session::new("B", shared(b_stream), "console", console.clone(), 0))
        .unwrap();

    a.write_all(b"exit\n").await.unwrap();
    engine.poll_once().await.unwrap();
    assert!(engine.streams().has_output("console"));

    b.write_all(b"greet -q\n").await.unwrap();
    engine.poll_once().await.unwrap();
    assert_eq!(received(&mut console_peer).await, "hi\n");

    b.write_all(b"exit\n").await.unwrap();
    engine.poll_once().await.unwrap();
    assert!(!engine.streams().has_output("console"));
    assert!(!console.lock().await.is_closed());
    received(&mut a).await;
    received(&mut b).await;
}

#[tokio::test]
async fn test_shutdown_closes_every_session() {
    let (mut engine, _) = engine();
    let mut a = attach(&mut engine, "A", 0);
    let mut b = attach(&mut engine, "B", 0);

    assert_eq!(engine.shutdown().await, 2);
    assert!(engine.sessions().is_empty());
    assert_eq!(received(&mut a).await, "");
    assert_eq!(received(&mut b).await, "");
}

#[tokio::test]
async fn test_partial_line_does_not_stall_other_sessions() {
    let (mut engine, _) = engine();
    let mut a = attach(&mut engine, "A", 0);
    let mut b = attach(&mut engine, "B", 0);

    a.write_all(b"gre").await.unwrap();
    b.write_all(b"greet -q\n").await.unwrap();
    let processed = tokio::time::timeout(Duration::from_secs(2), engine.poll_once())
        .await
        .expect("poll stalled on a partial line")
        .unwrap();

    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].stream, "B");
    assert_eq!(received(&mut b).await, "hi\n");

    a.write_all(b"et\n").await.unwrap();
    let processed = engine.poll_once().await.unwrap();
    assert_eq!(processed[0].stream, "A");
    assert_eq!(received(&mut a).await, "Hello there!\n");
}

#[tokio::test]
async fn test_closing_session_keeps_bare_output_it_wrote_to() {
    let (mut engine, _) = engine();
    let (log, mut log_peer) = pipe::pair("log", 256);
    let log = shared(log);
    let (a_stream, mut a) = pipe::pair("A", 256);
    engine.mount("log", log.clone(), Direction::Out).unwrap();
    engine
        .register_session(termplex_core::Session::new("A", shared(a_stream), "log", log, 0).owns_streams(true, false))
        .unwrap();

    a.write_all(b"greet -q\nexit\n").await.unwrap();
    engine.poll_once().await.unwrap();
    engine.poll_once().await.unwrap();

    assert!(engine.sessions().is_empty());
    assert!(engine.streams().has_output("log"));
    assert_eq!(received(&mut log_peer).await, "hi\n");
}
