//! Log output
//!
//! Without a `log` section env_logger writes to stderr. With one, records are
//! piped through a channel to [`LogSink`], a pingora service that appends
//! them to the configured file and flushes on shutdown.

use std::io::{self, Write};

use async_trait::async_trait;
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use pingora::{
    server::{ListenFds, ShutdownWatch},
    services::Service,
};
use tokio::{
    fs::{create_dir_all, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::config;

/// Initialize the global logger, returning the file sink service when one is
/// configured.
pub fn init(log: Option<&config::Log>) -> Option<LogSink> {
    match log {
        Some(cfg) => {
            let sink = LogSink::new(cfg.clone());
            builder()
                .target(Target::Pipe(Box::new(sink.writer())))
                .init();
            Some(sink)
        }
        None => {
            builder().init();
            None
        }
    }
}

fn builder() -> Builder {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .parse_env(Env::default());
    builder
}

/// `io::Write` end of the sink channel handed to env_logger
pub struct ChannelWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(buf.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct LogSink {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl LogSink {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    pub fn writer(&self) -> ChannelWriter {
        ChannelWriter {
            sender: self.sender.clone(),
        }
    }

    async fn open(&self) -> io::Result<BufWriter<tokio::fs::File>> {
        let path = std::path::Path::new(&self.config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        Ok(BufWriter::new(file))
    }

    /// Copy records to `file` until shutdown or until every writer is gone
    async fn pump(&mut self, file: &mut BufWriter<tokio::fs::File>, shutdown: &mut ShutdownWatch) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                },
                data = self.receiver.recv() => {
                    match data {
                        Some(data) => {
                            if let Err(e) = file.write_all(&data).await {
                                eprintln!("Failed to write to log file {}: {e}", self.config.path);
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // keep what was queued before shutdown
        while let Ok(data) = self.receiver.try_recv() {
            let _ = file.write_all(&data).await;
        }
    }
}

#[async_trait]
impl Service for LogSink {
    async fn start_service(&mut self, _fds: Option<ListenFds>, mut shutdown: ShutdownWatch) {
        let mut file = match self.open().await {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", self.config.path);
                return;
            }
        };

        self.pump(&mut file, &mut shutdown).await;

        if let Err(e) = file.flush().await {
            eprintln!("Failed to flush log file {}: {e}", self.config.path);
        }
    }

    fn name(&self) -> &'static str {
        "log sink"
    }

    fn threads(&self) -> Option<usize> {
        Some(1)
    }
}
