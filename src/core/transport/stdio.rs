//! Console transport over the process's stdin and stdout

use crate::core::session::Session;
use crate::core::stream::{shared, IoStream, StreamKind};

/// Input name of the console session
pub const STDIN_NAME: &str = "stdio/in";

/// Output name of the console session
pub const STDOUT_NAME: &str = "stdio/out";

/// Build the console session
///
/// The process's standard streams are borrowed: closing the session leaves
/// them open.
pub fn open(permission: u32) -> Session {
    let input = shared(IoStream::reader(StreamKind::Stdio, "stdin", tokio::io::stdin()));
    let output = shared(IoStream::writer(StreamKind::Stdio, "stdout", tokio::io::stdout()));
    Session::new(STDIN_NAME, input, STDOUT_NAME, output, permission)
}
