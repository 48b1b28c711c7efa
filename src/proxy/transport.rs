use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::warn;

/// One end of a message link. `recv` returns `None` once the link is
/// closed; `send` fails after close.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: Value) -> Result<()>;

    async fn recv(&self) -> Option<Value>;

    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// In-process transport backed by a pair of channels. `channel_pair`
/// returns the two ends of a duplex link: whatever one end sends, the
/// other receives.
pub struct ChannelTransport {
    tx: Mutex<Option<tokio::sync::mpsc::UnboundedSender<Value>>>,
    rx: tokio::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<Value>>>,
}

pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (left_tx, right_rx) = tokio::sync::mpsc::unbounded_channel();
    let (right_tx, left_rx) = tokio::sync::mpsc::unbounded_channel();
    (
        ChannelTransport {
            tx: Mutex::new(Some(left_tx)),
            rx: tokio::sync::Mutex::new(Some(left_rx)),
        },
        ChannelTransport {
            tx: Mutex::new(Some(right_tx)),
            rx: tokio::sync::Mutex::new(Some(right_rx)),
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: Value) -> Result<()> {
        let sender = self
            .tx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("transport is closed"))?;
        sender
            .send(message)
            .map_err(|_| anyhow!("peer transport is closed"))
    }

    async fn recv(&self) -> Option<Value> {
        let mut guard = self.rx.lock().await;
        let receiver = guard.as_mut()?;
        let message = receiver.recv().await;
        if message.is_none() {
            *guard = None;
        }
        message
    }

    async fn close(&self) {
        self.tx.lock().unwrap().take();
        self.rx.lock().await.take();
    }

    fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}

/// Transport speaking newline-delimited JSON-RPC over a child process's
/// stdio, the way local tool servers are launched.
pub struct StdioTransport {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    lines: tokio::sync::Mutex<Option<Lines<BufReader<ChildStdout>>>>,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl StdioTransport {
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {command}"))?;

        let stdin = child.stdin.take().context("child has no stdin")?;
        let stdout = child.stdout.take().context("child has no stdout")?;

        Ok(Self {
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            lines: tokio::sync::Mutex::new(Some(BufReader::new(stdout).lines())),
            child: Mutex::new(Some(child)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Value) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| anyhow!("transport is closed"))?;
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Option<Value> {
        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut()?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str(trimmed) {
                        Ok(message) => return Some(message),
                        Err(e) => {
                            warn!(error = %e, "ignoring non-JSON line from server");
                            continue;
                        }
                    }
                }
                Ok(None) => {
                    *guard = None;
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "server stdout read failed");
                    *guard = None;
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stdin.lock().await.take();
        self.lines.lock().await.take();
        if let Some(mut child) = self.child.lock().unwrap().take() {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill child process");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Transport serving the operator's client over this process's own
/// stdio, for running the proxy in place of the server the client meant
/// to launch. Diagnostics must go to stderr; stdout carries the protocol.
pub struct StdioServerTransport {
    stdout: tokio::sync::Mutex<Option<Stdout>>,
    lines: tokio::sync::Mutex<Option<Lines<BufReader<Stdin>>>>,
    closed: AtomicBool,
}

impl StdioServerTransport {
    pub fn new() -> Self {
        Self {
            stdout: tokio::sync::Mutex::new(Some(tokio::io::stdout())),
            lines: tokio::sync::Mutex::new(Some(BufReader::new(tokio::io::stdin()).lines())),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for StdioServerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioServerTransport {
    async fn send(&self, message: Value) -> Result<()> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard.as_mut().ok_or_else(|| anyhow!("transport is closed"))?;
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Option<Value> {
        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut()?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str(trimmed) {
                        Ok(message) => return Some(message),
                        Err(e) => {
                            warn!(error = %e, "ignoring non-JSON line from client");
                            continue;
                        }
                    }
                }
                Ok(None) => {
                    *guard = None;
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "client stdin read failed");
                    *guard = None;
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stdout.lock().await.take();
        self.lines.lock().await.take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
