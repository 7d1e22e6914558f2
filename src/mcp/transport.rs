//! Stdio transport
//!
//! Reads line-delimited messages from stdin and writes one response line per
//! request to stdout. Each message is handled in its own task so slow
//! handlers never block the read loop; writes are serialized through a
//! single writer lock so concurrent responses never interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{DataMcpError, ProtocolError, Result};

/// Handler invoked for every non-empty input line; `None` means no response.
pub type MessageHandler = Arc<dyn Fn(String) -> BoxFuture<'static, Option<String>> + Send + Sync>;

pub struct StdioTransport {
    handler: std::sync::Mutex<Option<MessageHandler>>,
    running: Arc<AtomicBool>,
    writer: Arc<Mutex<tokio::io::Stdout>>,
    read_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            handler: std::sync::Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            writer: Arc::new(Mutex::new(tokio::io::stdout())),
            read_task: std::sync::Mutex::new(None),
        }
    }

    /// Install the message handler. Must happen before [`start`](Self::start).
    pub fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.lock().expect("handler lock") = Some(handler);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the read loop. Fails if no handler is set or already running.
    pub fn start(&self) -> Result<()> {
        let handler = self
            .handler
            .lock()
            .expect("handler lock")
            .clone()
            .ok_or_else(|| {
                DataMcpError::Protocol(ProtocolError::Transport {
                    message: "Message handler must be set before starting".to_string(),
                })
            })?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DataMcpError::Protocol(ProtocolError::Transport {
                message: "Transport is already running".to_string(),
            }));
        }

        let running = Arc::clone(&self.running);
        let writer = Arc::clone(&self.writer);

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin());
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        info!("stdin closed, stopping transport");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if running.load(Ordering::SeqCst) {
                            error!(error = %err, "Error reading from stdin");
                        }
                        break;
                    }
                }

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let message = line.trim().to_string();
                if message.is_empty() {
                    continue;
                }

                // Handle concurrently; the read loop moves straight on.
                let handler = Arc::clone(&handler);
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    if let Some(response) = handler(message).await {
                        write_line(&writer, &response).await;
                    }
                });
            }

            running.store(false, Ordering::SeqCst);
        });

        *self.read_task.lock().expect("read task lock") = Some(task);
        info!("Stdio transport started");
        Ok(())
    }

    /// Stop reading. Idempotent. Outstanding handlers keep their writer
    /// handle and still emit their responses.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stdio transport stopped");
        }
        if let Some(task) = self.read_task.lock().expect("read task lock").take() {
            task.abort();
        }
    }

    /// Send one message as a single output line.
    pub async fn send(&self, message: &str) {
        write_line(&self.writer, message).await;
    }

    /// Block until the read loop terminates (EOF or stop).
    pub async fn wait(&self) {
        let task = self.read_task.lock().expect("read task lock").take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn write_line(writer: &Arc<Mutex<tokio::io::Stdout>>, message: &str) {
    let mut out = writer.lock().await;
    if let Err(err) = out.write_all(message.as_bytes()).await {
        error!(error = %err, "Failed to write response");
        return;
    }
    if let Err(err) = out.write_all(b"\n").await {
        error!(error = %err, "Failed to write response terminator");
        return;
    }
    if let Err(err) = out.flush().await {
        error!(error = %err, "Failed to flush stdout");
    }
}
