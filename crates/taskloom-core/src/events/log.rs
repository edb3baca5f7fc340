//! Append-only newline-delimited JSON event log.
//!
//! Each line is one serialized [`Event`]. Appends go through a single
//! mutex-guarded file handle, so concurrent producers never interleave
//! partial lines. [`EventLog::recover`] replays well-formed lines in file
//! order and skips anything it cannot parse (e.g. a torn final write).

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::envelope::Event;
use crate::events::error::{EventError, EventResult};

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    writer: Mutex<File>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> EventError + '_ {
    move |source| EventError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl EventLog {
    /// Open `path` for appending, creating the file and any missing parent
    /// directories.
    pub async fn open(path: impl AsRef<Path>) -> EventResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_err(parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err(&path))?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it.
    pub async fn append(&self, event: &Event) -> EventResult<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(io_err(&self.path))?;
        writer.flush().await.map_err(io_err(&self.path))?;
        Ok(())
    }

    /// Every well-formed record, in file order.
    pub async fn recover(&self) -> EventResult<Vec<Event>> {
        let _writer = self.writer.lock().await;
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(io_err(&self.path))?;

        let mut events = Vec::new();
        for (lineno, line) in bytes.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => debug!(line = lineno + 1, error = %e, "skipping malformed log line"),
            }
        }
        Ok(events)
    }

    /// Truncate the log to zero length.
    pub async fn clear(&self) -> EventResult<()> {
        let writer = self.writer.lock().await;
        writer.set_len(0).await.map_err(io_err(&self.path))?;
        Ok(())
    }
}
