//! Subprocess automation driver client.
//!
//! Spawns one driver process per tenant and bridges its stdio to the
//! gateway: commands go out as JSON lines on stdin, events come back on
//! stdout. Command completions are correlated by `request_id`; lifecycle
//! events are forwarded to the owning session's event channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, warn};
use ulid::Ulid;

use chatbridge_driver_protocol::{DriverCommand, DriverEvent};

use crate::config::DriverConfig;

use super::{AutomationClient, ClientError, ClientFactory};

/// Outcome of a correlated driver command: the optional group id from
/// `CommandOk`, or the driver's error.
type CommandOutcome = Result<Option<String>, ClientError>;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<CommandOutcome>>>>;

/// Capacity of the command channel into the bridge task.
const COMMAND_CAPACITY: usize = 32;

// ============================================================================
// Factory
// ============================================================================

/// Spawns one driver process per tenant.
pub struct SubprocessClientFactory {
    config: DriverConfig,
    profile_root: PathBuf,
}

impl SubprocessClientFactory {
    pub fn new(config: DriverConfig, profile_root: PathBuf) -> Self {
        Self {
            config,
            profile_root,
        }
    }
}

impl ClientFactory for SubprocessClientFactory {
    fn create(
        &self,
        tenant_id: &str,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Arc<dyn AutomationClient>, ClientError> {
        let profile_dir = self.profile_root.join(tenant_id);
        std::fs::create_dir_all(&profile_dir)?;

        let client = SubprocessClient::spawn(&self.config, tenant_id, &profile_dir, events)?;
        Ok(Arc::new(client))
    }
}

// ============================================================================
// Client
// ============================================================================

/// Automation client backed by a driver subprocess.
pub struct SubprocessClient {
    tenant_id: String,
    cmd_tx: mpsc::Sender<DriverCommand>,
    pending: PendingMap,
    command_timeout: Duration,
}

impl SubprocessClient {
    /// Spawn the driver process and the stdio bridge task.
    pub fn spawn(
        config: &DriverConfig,
        tenant_id: &str,
        profile_dir: &std::path::Path,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Self, ClientError> {
        let child = spawn_child(config, tenant_id, profile_dir)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let bridge = Bridge {
            tenant_id: tenant_id.to_string(),
            pending: pending.clone(),
            events,
        };
        tokio::spawn(bridge.run(child, cmd_rx));

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            cmd_tx,
            pending,
            command_timeout: Duration::from_secs(config.command_timeout_seconds),
        })
    }

    /// Send a correlated command and wait for its completion event.
    async fn request(&self, request_id: String, command: DriverCommand) -> CommandOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), reply_tx);

        if self.cmd_tx.send(command).await.is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(ClientError::Unavailable(
                "driver process is gone".to_string(),
            ));
        }

        match tokio::time::timeout(self.command_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Unavailable(
                "driver exited before responding".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(ClientError::Timeout)
            }
        }
    }
}

#[async_trait]
impl AutomationClient for SubprocessClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        self.cmd_tx
            .send(DriverCommand::Initialize)
            .await
            .map_err(|_| ClientError::Unavailable("driver process is gone".to_string()))
    }

    async fn send_message(&self, destination: &str, body: &str) -> Result<(), ClientError> {
        let request_id = Ulid::new().to_string();
        let command = DriverCommand::SendMessage {
            request_id: request_id.clone(),
            destination: destination.to_string(),
            body: body.to_string(),
        };
        self.request(request_id, command).await.map(|_| ())
    }

    async fn accept_invite(&self, code: &str) -> Result<String, ClientError> {
        let request_id = Ulid::new().to_string();
        let command = DriverCommand::AcceptInvite {
            request_id: request_id.clone(),
            code: code.to_string(),
        };
        match self.request(request_id, command).await? {
            Some(group_id) => Ok(group_id),
            None => Err(ClientError::Rejected {
                code: "missing_group_id".to_string(),
                message: format!(
                    "driver for tenant '{}' completed accept_invite without a group id",
                    self.tenant_id
                ),
            }),
        }
    }
}

// ============================================================================
// Stdio Bridge
// ============================================================================

struct Bridge {
    tenant_id: String,
    pending: PendingMap,
    events: mpsc::Sender<DriverEvent>,
}

impl Bridge {
    /// Bridge the driver's stdio to channels until the process exits or the
    /// command channel closes.
    async fn run(self, mut child: Child, mut cmd_rx: mpsc::Receiver<DriverCommand>) {
        let Some(stdin) = child.stdin.take() else {
            error!(tenant_id = %self.tenant_id, "driver stdin not piped");
            return;
        };
        let Some(stdout) = child.stdout.take() else {
            error!(tenant_id = %self.tenant_id, "driver stdout not piped");
            return;
        };

        let mut stdin = stdin;
        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut exit_reason = "driver exited".to_string();

        loop {
            tokio::select! {
                // Events from the driver's stdout
                line = stdout_reader.next_line() => {
                    match line {
                        Ok(Some(line)) => match serde_json::from_str::<DriverEvent>(&line) {
                            Ok(event) => self.handle_event(event).await,
                            Err(e) => {
                                warn!(
                                    tenant_id = %self.tenant_id,
                                    line = %line,
                                    error = %e,
                                    "failed to parse driver event"
                                );
                            }
                        },
                        Ok(None) => {
                            debug!(tenant_id = %self.tenant_id, "driver stdout closed");
                            break;
                        }
                        Err(e) => {
                            error!(tenant_id = %self.tenant_id, error = %e, "error reading driver stdout");
                            break;
                        }
                    }
                }

                // Commands to the driver's stdin
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            if !self.write_command(&mut stdin, &command).await {
                                break;
                            }
                        }
                        None => {
                            // Client dropped; ask the driver to stop.
                            let _ = self.write_command(&mut stdin, &DriverCommand::Shutdown).await;
                            exit_reason = "client shut down".to_string();
                            break;
                        }
                    }
                }

                // Driver process exited on its own
                status = child.wait() => {
                    match status {
                        Ok(status) => {
                            warn!(tenant_id = %self.tenant_id, status = %status, "driver process exited");
                            exit_reason = format!("driver exited ({status})");
                        }
                        Err(e) => {
                            error!(tenant_id = %self.tenant_id, error = %e, "error waiting for driver");
                            exit_reason = "driver exited (wait failed)".to_string();
                        }
                    }
                    self.teardown(&exit_reason).await;
                    return;
                }
            }
        }

        let _ = child.kill().await;
        let _ = child.wait().await;
        self.teardown(&exit_reason).await;
    }

    async fn handle_event(&self, event: DriverEvent) {
        match event {
            DriverEvent::CommandOk {
                request_id,
                group_id,
            } => {
                self.complete(&request_id, Ok(group_id)).await;
            }
            DriverEvent::CommandError {
                request_id,
                code,
                message,
            } => {
                self.complete(&request_id, Err(ClientError::Rejected { code, message }))
                    .await;
            }
            lifecycle => {
                if self.events.send(lifecycle).await.is_err() {
                    debug!(tenant_id = %self.tenant_id, "session event channel closed");
                }
            }
        }
    }

    async fn complete(&self, request_id: &str, outcome: CommandOutcome) {
        match self.pending.lock().await.remove(request_id) {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => {
                debug!(
                    tenant_id = %self.tenant_id,
                    request_id = %request_id,
                    "completion for unknown request (likely timed out)"
                );
            }
        }
    }

    async fn write_command(
        &self,
        stdin: &mut tokio::process::ChildStdin,
        command: &DriverCommand,
    ) -> bool {
        let json = match serde_json::to_string(command) {
            Ok(json) => json,
            Err(e) => {
                error!(tenant_id = %self.tenant_id, error = %e, "failed to serialize driver command");
                return true;
            }
        };
        let line = format!("{json}\n");
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            error!(tenant_id = %self.tenant_id, error = %e, "failed to write to driver stdin");
            return false;
        }
        if let Err(e) = stdin.flush().await {
            error!(tenant_id = %self.tenant_id, error = %e, "failed to flush driver stdin");
            return false;
        }
        true
    }

    /// Fail outstanding requests and tell the session the connection is gone.
    async fn teardown(&self, reason: &str) {
        let pending = {
            let mut map = self.pending.lock().await;
            std::mem::take(&mut *map)
        };
        for (_, reply) in pending {
            let _ = reply.send(Err(ClientError::Unavailable(reason.to_string())));
        }

        let _ = self
            .events
            .send(DriverEvent::Disconnected {
                reason: reason.to_string(),
            })
            .await;
    }
}

fn spawn_child(
    config: &DriverConfig,
    tenant_id: &str,
    profile_dir: &std::path::Path,
) -> std::io::Result<Child> {
    let mut cmd = Command::new(&config.command);
    cmd.args(driver_args(config, tenant_id, profile_dir))
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    // On Linux, make sure the driver dies with the gateway.
    #[cfg(target_os = "linux")]
    unsafe {
        cmd.pre_exec(|| {
            // PR_SET_PDEATHSIG = 1, SIGTERM = 15
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    cmd.spawn()
}

fn driver_args(
    config: &DriverConfig,
    tenant_id: &str,
    profile_dir: &std::path::Path,
) -> Vec<String> {
    let mut args = config.args.clone();
    args.push("--tenant".to_string());
    args.push(tenant_id.to_string());
    args.push("--profile".to_string());
    args.push(profile_dir.display().to_string());
    args
}
