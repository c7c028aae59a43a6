//! Helpers shared by the integration tests

#![allow(dead_code)]

use clap::Parser;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use termplex_core::core::transport::pipe;
use termplex_core::{shared, CommandTable, Engine, EngineConfig, Output, Session};
use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream};

/// Greets the caller
#[derive(Parser, Debug)]
pub struct GreetArgs {
    /// Short greeting
    #[arg(short, long)]
    pub quiet: bool,
}

/// Restarts the device
#[derive(Parser, Debug)]
pub struct RestartArgs {}

/// Engine with `greet` (level 0) and `restart` (level 5); the counter tracks handler calls
pub fn engine() -> (Engine, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut table = CommandTable::new();

    let counter = calls.clone();
    table
        .register("greet", 0, move |args: GreetArgs, out: &mut Output| {
            counter.fetch_add(1, Ordering::SeqCst);
            out.println(if args.quiet { "hi" } else { "Hello there!" });
            Ok(args.quiet)
        })
        .unwrap();

    let counter = calls.clone();
    table
        .register("restart", 5, move |_: RestartArgs, out: &mut Output| {
            counter.fetch_add(1, Ordering::SeqCst);
            out.println("restarting");
            Ok(())
        })
        .unwrap();

    let config = EngineConfig::default().poll_timeout(Some(Duration::from_millis(50)));
    (Engine::with_commands(config, table), calls)
}

/// Register a duplex pipe session owning its stream, returning the peer end
pub fn attach(engine: &mut Engine, name: &str, permission: u32) -> DuplexStream {
    attach_with(engine, name, |session| session.owns_streams(true, true), permission)
}

/// Register a duplex pipe session after customizing it
pub fn attach_with(
    engine: &mut Engine,
    name: &str,
    customize: impl FnOnce(Session) -> Session,
    permission: u32,
) -> DuplexStream {
    let (stream, peer) = pipe::pair(name, 4096);
    let session = customize(Session::duplex(name, shared(stream), permission));
    engine.register_session(session).unwrap();
    peer
}

/// Everything the peer can read within a short quiet period
pub async fn received(peer: &mut (impl AsyncRead + Unpin)) -> String {
    let mut text = Vec::new();
    let mut buf = [0u8; 1024];
    while let Ok(Ok(n)) = tokio::time::timeout(Duration::from_millis(100), peer.read(&mut buf)).await {
        if n == 0 {
            break;
        }
        text.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(text).unwrap()
}
