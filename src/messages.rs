use tokio::sync::oneshot;

use crate::writer::LogLine;

/// Messages consumed by the log writer task
#[derive(Debug)]
pub enum WriterMessage {
    /// Append a line to the log file
    Append(LogLine),
    /// Write the end banner, flush, and acknowledge once the file is closed
    Close(oneshot::Sender<()>),
}

/// Sent once to the polling task over its stop channel
#[derive(Debug)]
pub enum PollerMessage {
    /// Finish the current cycle and exit
    Stop,
}
