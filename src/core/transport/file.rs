//! File transport: commands from one file, results into another

use super::TransportError;
use crate::core::session::Session;
use crate::core::stream::{shared, IoStream, StreamKind};
use std::path::Path;
use tokio::fs::{File, OpenOptions};

/// Open a read-only stream over a command file
pub async fn open_input(path: &Path) -> Result<IoStream, TransportError> {
    let file = File::open(path).await.map_err(|e| map_open_error(path, e))?;
    Ok(IoStream::reader(StreamKind::File, path.display().to_string(), file))
}

/// Open a write-only stream, truncating or appending
pub async fn open_output(path: &Path, append: bool) -> Result<IoStream, TransportError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await
        .map_err(|e| map_open_error(path, e))?;
    Ok(IoStream::writer(StreamKind::File, path.display().to_string(), file))
}

/// Build a session reading `input` and writing `output`
///
/// Both files are owned by the session, so reaching the end of the input
/// closes the output file too.
pub async fn open(input: &Path, output: &Path, append: bool, permission: u32) -> Result<Session, TransportError> {
    let reader = shared(open_input(input).await?);
    let writer = shared(open_output(output, append).await?);
    Ok(Session::new(
        format!("file:{}", input.display()),
        reader,
        format!("file:{}", output.display()),
        writer,
        permission,
    )
    .owns_streams(true, true))
}

fn map_open_error(path: &Path, e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::NotFound => TransportError::FileNotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => TransportError::PermissionDenied(path.display().to_string()),
        _ => TransportError::IoError(e),
    }
}
