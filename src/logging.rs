use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::Local;
use log::{Level, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const FEED_CAPACITY: usize = 256;

static LOGGER: OnceLock<FeedLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Writes records to stderr and republishes them to any subscribed log view.
pub struct FeedLogger {
    sender: broadcast::Sender<LogMessage>,
    level: Level,
}

impl FeedLogger {
    pub fn new(level: Level) -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender, level }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogMessage> {
        self.sender.subscribe()
    }

    fn emit_log(&self, record: &Record) {
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };

        // No subscribers is the common case.
        let _ = self.sender.send(log_message);
    }
}

impl log::Log for FeedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
            self.emit_log(record);
        }
    }

    fn flush(&self) {}
}

/// Install the feed logger as the global logger and return a subscription
/// to its records.
pub fn init(level: Level) -> Result<broadcast::Receiver<LogMessage>, SetLoggerError> {
    let logger = LOGGER.get_or_init(|| FeedLogger::new(level));
    log::set_logger(logger).map(|()| log::set_max_level(level.to_level_filter()))?;
    Ok(logger.subscribe())
}

/// Append every record from `feed` to `path` as one JSON object per line,
/// until the feed closes.
pub async fn write_feed_to_file(
    mut feed: broadcast::Receiver<LogMessage>,
    path: PathBuf,
) -> crate::error::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;

    loop {
        match feed.recv().await {
            Ok(message) => {
                let mut line = serde_json::to_string(&message)?;
                line.push('\n');
                file.write_all(line.as_bytes()).await?;
            }
            // Logging here would feed back into the channel.
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn forwards_enabled_records_to_subscribers() {
        let logger = FeedLogger::new(Level::Info);
        let mut feed = logger.subscribe();

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("scan failed"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("filtered out"))
                .build(),
        );

        let message = feed.try_recv().unwrap();
        assert_eq!(message.level, "WARN");
        assert_eq!(message.message, "scan failed");
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn file_sink_writes_one_json_line_per_record() {
        let logger = FeedLogger::new(Level::Info);
        let path = std::env::temp_dir().join(format!("blox-log-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = tokio::spawn(write_feed_to_file(logger.subscribe(), path.clone()));

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("connected"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .args(format_args!("write failed"))
                .build(),
        );
        drop(logger);
        sink.await.unwrap().unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let messages: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["message"], "connected");
        assert_eq!(messages[1]["level"], "ERROR");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
