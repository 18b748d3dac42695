//! STDIO Transport
//!
//! The client spawns the server as a child process with piped stdin, stdout and
//! stderr. Each envelope is written as one line to the child's stdin, and the
//! reply is the next line read back from its stdout. stderr is forwarded to the
//! log.

use async_trait::async_trait;
use log::{ debug, info, warn };
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader };
use tokio::process::{ Child, ChildStdin, ChildStdout, Command };
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::errors::Error;
use crate::protocol::expects_reply;
use crate::transport::Transport;

/// How to launch and talk to a server process
#[derive(Debug, Clone)]
pub struct StdioOptions {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Delay before the child's liveness is checked after spawning
    pub startup_grace: Duration,
    pub request_timeout: Duration,
    pub stop_timeout: Duration,
}

impl StdioOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            startup_grace: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// A running server process and its pipes
struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr_task: JoinHandle<()>,
}

impl ChildProcess {
    fn exit_status(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => "still running".to_string(),
            Err(e) => format!("unknown ({})", e),
        }
    }
}

/// A transport that talks to a child process over its standard streams
pub struct StdioTransport {
    options: StdioOptions,
    process: Mutex<Option<ChildProcess>>,
}

impl StdioTransport {
    pub fn new(options: StdioOptions) -> Self {
        Self { options, process: Mutex::new(None) }
    }

    pub fn options(&self) -> &StdioOptions {
        &self.options
    }

    fn spawn(&self) -> Result<Child, Error> {
        let mut command = Command::new(&self.options.command);
        command
            .args(&self.options.args)
            .envs(&self.options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.options.cwd {
            command.current_dir(cwd);
        }

        command
            .spawn()
            .map_err(|e| {
                Error::Transport(format!("Failed to spawn '{}': {}", self.options.command, e))
            })
    }
}

/// Drain whatever a dead child left in a pipe
async fn read_remaining<R: AsyncReadExt + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut output = String::new();
    // A grandchild may still hold the pipe open
    let _ = tokio::time::timeout(Duration::from_secs(1), pipe.read_to_string(&mut output)).await;
    output.trim().to_string()
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<(), Error> {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return Ok(());
        }

        info!("Starting server process: {} {:?}", self.options.command, self.options.args);
        let mut child = self.spawn()?;

        tokio::time::sleep(self.options.startup_grace).await;

        if let Some(status) = child.try_wait()? {
            let stderr = read_remaining(child.stderr.take()).await;
            let stdout = read_remaining(child.stdout.take()).await;
            return Err(
                Error::Transport(
                    format!(
                        "Server process exited during startup ({}). stderr: {} stdout: {}",
                        status,
                        if stderr.is_empty() { "<empty>" } else { &stderr },
                        if stdout.is_empty() { "<empty>" } else { &stdout }
                    )
                )
            );
        }

        let stdin = child.stdin
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdin handle".to_string()))?;
        let stdout = child.stdout
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdout handle".to_string()))?;
        let stderr = child.stderr
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stderr handle".to_string()))?;

        let command = self.options.command.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[{} stderr] {}", command, line);
            }
        });

        *process = Some(ChildProcess {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr_task,
        });
        info!("Server process started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        let Some(mut process) = self.process.lock().await.take() else {
            return Ok(());
        };

        // Closing stdin is the shutdown signal for a well-behaved server
        drop(process.stdin.take());
        match tokio::time::timeout(self.options.stop_timeout, process.child.wait()).await {
            Ok(Ok(status)) => info!("Server process exited: {}", status),
            Ok(Err(e)) => warn!("Failed to wait for server process: {}", e),
            Err(_) => {
                warn!("Server process did not exit within {:?}, killing it", self.options.stop_timeout);
                if let Err(e) = process.child.kill().await {
                    warn!("Failed to kill server process: {}", e);
                }
            }
        }
        process.stderr_task.abort();
        Ok(())
    }

    async fn send(&self, message: &str) -> Result<Option<String>, Error> {
        let mut guard = self.process.lock().await;
        let process = guard
            .as_mut()
            .ok_or_else(|| Error::Transport("Stdio transport is not started".to_string()))?;

        if let Ok(Some(status)) = process.child.try_wait() {
            return Err(Error::Transport(format!("Server process has exited ({})", status)));
        }

        let stdin = process.stdin
            .as_mut()
            .ok_or_else(|| Error::Transport("Server stdin is closed".to_string()))?;
        let line = format!("{}\n", message.trim_end());
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            let status = process.exit_status();
            return Err(Error::Transport(format!("Failed to write to server ({}): {}", status, e)));
        }

        if !expects_reply(message) {
            return Ok(None);
        }

        let mut reply = String::new();
        loop {
            reply.clear();
            let read = tokio::time::timeout(
                self.options.request_timeout,
                process.stdout.read_line(&mut reply)
            ).await;
            match read {
                Err(_) => {
                    return Err(
                        Error::Timeout(
                            format!("No reply from server within {:?}", self.options.request_timeout)
                        )
                    );
                }
                Ok(Ok(0)) => {
                    let status = process.exit_status();
                    return Err(Error::Transport(format!("Server process closed stdout ({})", status)));
                }
                Ok(Ok(_)) if reply.trim().is_empty() => {
                    continue;
                }
                Ok(Ok(_)) => {
                    return Ok(Some(reply.trim_end().to_string()));
                }
                Ok(Err(e)) => {
                    return Err(Error::Transport(format!("Failed to read from server: {}", e)));
                }
            }
        }
    }
}
