use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Append-only plain-text log of exchanges, one event per line.
///
/// The file is opened and closed on every write, so concurrent exchanges
/// never share a descriptor and nothing stays open between messages.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, message: &str) -> std::io::Result<()> {
        let line = format_line(Local::now().naive_local(), message);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// `[YYYY-MM-DD HH:MM:SS] message\n`, with line breaks inside the message escaped.
pub fn format_line(at: NaiveDateTime, message: &str) -> String {
    let message = message
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    format!("[{}] {}\n", at.format("%Y-%m-%d %H:%M:%S"), message)
}
