use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::LogFileError;
use crate::messages::WriterMessage;
use crate::tracker::{ClosedSession, Timestamp};

/// Time format used inside the log
const TIME_FORMAT: &str = "%H:%M:%S %d-%m-%Y";
/// Time format used in log file names
const FILE_TIME_FORMAT: &str = "%d-%m-%Y-%H%M";
/// Rendered in place of an unknown start time
const UNKNOWN_TIME: &str = " - ";

/// Name for a log file created at `now`
pub fn log_file_name(now: DateTime<Local>) -> String {
    format!("log-{}.txt", now.format(FILE_TIME_FORMAT))
}

/// Render a timestamp in local time, or the unknown marker
pub fn format_time(time: Option<Timestamp>) -> String {
    time.and_then(|t| Local.timestamp_millis_opt(t.millis()).single())
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_TIME.to_string())
}

/// One entry of the activity log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine(String);

impl LogLine {
    /// Fixed-width `app start end` columns
    pub fn session(session: &ClosedSession) -> Self {
        Self(format!(
            "{:>30} {:>20} {:>20}",
            session.app.as_str(),
            format_time(session.start),
            format_time(Some(session.end)),
        ))
    }

    pub fn start_banner(at: DateTime<Local>) -> Self {
        Self(format!("Starting log at {}.\n", at.format(TIME_FORMAT)))
    }

    pub fn end_banner(at: DateTime<Local>) -> Self {
        Self(format!("------------\nEnd logging at {} .", at.format(TIME_FORMAT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission side of the writer channel, held by the polling task
#[derive(Debug, Clone)]
pub struct LogSender {
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl LogSender {
    /// Queue a line for appending. Never blocks.
    pub fn submit(&self, line: LogLine) {
        if self.tx.send(WriterMessage::Append(line)).is_err() {
            warn!("Log writer is gone, dropping line");
        }
    }
}

#[cfg(test)]
impl LogSender {
    pub(crate) fn for_test(tx: mpsc::UnboundedSender<WriterMessage>) -> Self {
        Self { tx }
    }
}

/// Owns the log file through a dedicated writer task.
///
/// Lines are appended in the order they were submitted.
pub struct LogWriter {
    path: PathBuf,
    sender: LogSender,
    task: JoinHandle<()>,
}

impl LogWriter {
    /// Create (or append to) the file at `path`, write the start banner and
    /// spawn the writer task.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LogFileError> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| LogFileError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LogFileError::Open {
                path: path.clone(),
                source,
            })?;

        write_line(&mut file, &LogLine::start_banner(Local::now()))
            .await
            .map_err(|source| LogFileError::Banner {
                path: path.clone(),
                source,
            })?;

        info!("Start logging to file {}", path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(file, path.clone(), rx));

        Ok(Self {
            path,
            sender: LogSender { tx },
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A cloneable handle for submitting lines
    pub fn sender(&self) -> LogSender {
        self.sender.clone()
    }

    /// Drain queued lines, write the end banner and close the file.
    ///
    /// Callers must not submit anything after this is invoked.
    pub async fn close(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.tx.send(WriterMessage::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }

        if let Err(e) = self.task.await {
            error!("Log writer task failed: {}", e);
        }
    }
}

async fn write_line<W>(file: &mut W, line: &LogLine) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    file.write_all(line.as_str().as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

async fn finish<W>(mut file: W, path: &Path)
where
    W: AsyncWrite + Unpin,
{
    let banner = LogLine::end_banner(Local::now());
    debug!("{}", banner);
    if let Err(e) = write_line(&mut file, &banner).await {
        error!("Failed to write end banner to {}: {}", path.display(), e);
    }
    if let Err(e) = file.shutdown().await {
        warn!("Failed to close {}: {}", path.display(), e);
    }
}

async fn run_writer<W>(
    mut file: W,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Append(line) => {
                if let Err(e) = write_line(&mut file, &line).await {
                    error!("Failed to append to {}: {}", path.display(), e);
                }
            }
            WriterMessage::Close(ack) => {
                finish(file, &path).await;
                let _ = ack.send(());
                return;
            }
        }
    }

    // Every sender dropped without an explicit close
    finish(file, &path).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::ApplicationId;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    #[test]
    fn test_file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(log_file_name(at), "log-07-03-2024-0905.txt");
    }

    #[test]
    fn test_session_line_columns() {
        let end = Local.with_ymd_and_hms(2024, 3, 7, 14, 30, 15).unwrap();
        let session = ClosedSession {
            app: ApplicationId::from("firefox"),
            start: None,
            end: Timestamp(end.timestamp_millis()),
        };

        let line = LogLine::session(&session);
        let expected = format!(
            "{}firefox {} -   14:30:15 07-03-2024",
            " ".repeat(23),
            " ".repeat(17),
        );
        assert_eq!(line.as_str(), expected);
        assert_eq!(line.as_str().len(), 30 + 1 + 20 + 1 + 20);
    }

    #[test]
    fn test_long_app_name_is_not_truncated() {
        let name = "a".repeat(40);
        let session = ClosedSession {
            app: ApplicationId::from(name.as_str()),
            start: Some(Timestamp(0)),
            end: Timestamp(1_000),
        };
        assert!(LogLine::session(&session).as_str().starts_with(&name));
    }

    #[tokio::test]
    async fn test_lines_written_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.txt");

        let writer = LogWriter::open(&path).await.unwrap();
        let sender = writer.sender();
        for name in ["L1", "L2", "L3"] {
            sender.submit(LogLine(name.to_string()));
            tokio::task::yield_now().await;
        }
        writer.close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("Starting log at "));
        assert_eq!(lines[1], "");
        assert_eq!(&lines[2..5], &["L1", "L2", "L3"]);
        assert_eq!(lines[5], "------------");
        assert!(lines[6].starts_with("End logging at "));
        assert_eq!(lines.len(), 7);
    }

    /// Fails the first write, then records everything into `written`
    struct FlakyWriter {
        failed_once: bool,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl AsyncWrite for FlakyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if !self.failed_once {
                self.failed_once = true;
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_append_does_not_stop_writer() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let file = FlakyWriter {
            failed_once: false,
            written: written.clone(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(file, PathBuf::from("flaky.txt"), rx));
        for name in ["L1", "L2", "L3"] {
            tx.send(WriterMessage::Append(LogLine(name.to_string()))).unwrap();
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(WriterMessage::Close(ack_tx)).unwrap();
        ack_rx.await.unwrap();
        task.await.unwrap();

        let content = String::from_utf8(written.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(&lines[..3], &["L2", "L3", "------------"]);
        assert!(lines[3].starts_with("End logging at "));
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        LogWriter::open(&path).await.unwrap().close().await;
        LogWriter::open(&path).await.unwrap().close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Starting log at").count(), 2);
        assert_eq!(content.matches("End logging at").count(), 2);
    }

    #[tokio::test]
    async fn test_open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = LogWriter::open(blocker.join("sub").join("log.txt")).await;
        assert!(matches!(result, Err(LogFileError::CreateDir { .. })));
    }
}
