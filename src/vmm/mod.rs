//! VM Supervisor (§4.2): single-owner lifecycle of `GuestInstance`s.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::antivm::{self, DisplayMode, SocketPaths};
use crate::control::qmp::QmpClient;
use crate::error::{Error, Result};
use crate::profile::{GuestProfile, HardwareMask};

/// Runtime state of a `GuestInstance` (§3 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Spawning,
    Running,
    Suspended,
    Stopping,
    Gone,
}

/// Mutable runtime record, exclusively owned by the `Supervisor` (§3, §9:
/// "instances are data-only; all operations on an instance are methods on
/// the Supervisor keyed by name").
pub struct GuestInstance {
    pub profile: Arc<GuestProfile>,
    pub mask: HardwareMask,
    pub sockets: SocketPaths,
    pub state: InstanceState,
    pub pid: Option<u32>,
    pub boot_start: Instant,
    child: Child,
}

impl GuestInstance {
    pub fn name(&self) -> &str {
        &self.profile.name
    }
}

/// Owns every launched `GuestInstance` behind a single async mutex. Spec
/// §5 allows but does not require one thread per guest; a shared mutex over
/// the instance map is sufficient since every operation already awaits I/O.
pub struct Supervisor {
    sockets_dir: std::path::PathBuf,
    kvm_available: bool,
    instances: Mutex<HashMap<String, GuestInstance>>,
}

impl Supervisor {
    pub fn new(sockets_dir: impl Into<std::path::PathBuf>) -> Self {
        let sockets_dir = sockets_dir.into();
        let kvm_available = std::fs::metadata("/dev/kvm")
            .map(|_| true)
            .unwrap_or(false);
        Supervisor {
            sockets_dir,
            kvm_available,
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn socket_paths(&self, name: &str) -> SocketPaths {
        let pid = std::process::id();
        SocketPaths {
            monitor: self.sockets_dir.join(format!("{name}_{pid}_monitor.sock")),
            serial: self.sockets_dir.join(format!("{name}_{pid}_serial.sock")),
            agent: self.sockets_dir.join(format!("{name}_{pid}_agent.sock")),
        }
    }

    /// Spawns the QEMU child, polls for the monitor socket, and performs the
    /// first QMP handshake (`spawning -> running`, §3). On failure the
    /// instance is never inserted into the map.
    pub async fn launch(&self, profile: GuestProfile, mask: HardwareMask) -> Result<()> {
        profile.validate()?;
        let name = profile.name.clone();
        let sockets = self.socket_paths(&name);
        for path in [&sockets.monitor, &sockets.serial, &sockets.agent] {
            let _ = std::fs::remove_file(path);
        }
        if let Some(parent) = sockets.monitor.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let argv = antivm::assemble(&profile, &mask, &sockets, self.kvm_available, DisplayMode::None)?;
        info!(instance = %name, args = argv.len(), "launching guest");

        let mut command = Command::new(profile.arch.qemu_binary());
        command
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(Error::Io)?;
        let pid = child.id();

        let boot_start = Instant::now();
        let deadline = boot_start + profile.boot_timeout;

        loop {
            if sockets.monitor.exists() {
                break;
            }
            if let Some(status) = child.try_wait().map_err(Error::Io)? {
                let stderr = read_all_stderr(&mut child).await;
                warn!(instance = %name, %status, "guest exited before monitor socket appeared");
                return Err(Error::LaunchTimeout {
                    instance: name,
                    timeout_ms: profile.boot_timeout.as_millis() as u64,
                    stderr,
                });
            }
            if Instant::now() >= deadline {
                let _ = child.start_kill();
                let stderr = read_all_stderr(&mut child).await;
                warn!(instance = %name, "boot timeout waiting for monitor socket");
                return Err(Error::LaunchTimeout {
                    instance: name,
                    timeout_ms: profile.boot_timeout.as_millis() as u64,
                    stderr,
                });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // First QMP greeting is the `spawning -> running` transition (§3).
        let mut qmp = QmpClient::connect(&sockets.monitor).await?;
        qmp.handshake().await?;

        let instance = GuestInstance {
            profile: Arc::new(profile),
            mask,
            sockets,
            state: InstanceState::Running,
            pid,
            boot_start,
            child,
        };
        self.instances.lock().await.insert(name, instance);
        Ok(())
    }

    /// Graceful `system_powerdown`, wait <=10s, escalate to kill; idempotent.
    pub async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let mut instances = self.instances.lock().await;
        let Some(instance) = instances.get_mut(name) else {
            return Ok(());
        };
        instance.state = InstanceState::Stopping;

        if !force {
            if let Ok(mut qmp) = QmpClient::connect(&instance.sockets.monitor).await {
                let _ = qmp.handshake().await;
                let _ = qmp.system_powerdown().await;
                let waited = wait_for_exit(&mut instance.child, Duration::from_secs(10)).await;
                if waited {
                    finish_stop(instance).await;
                    instances.remove(name);
                    return Ok(());
                }
            }
        }

        let _ = instance.child.start_kill();
        let _ = instance.child.wait().await;
        finish_stop(instance).await;
        instances.remove(name);
        Ok(())
    }

    /// Guarantees no child survives; invoked on process teardown.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        for name in names {
            let _ = self.stop(&name, true).await;
        }
    }

    pub async fn is_running(&self, name: &str) -> bool {
        matches!(
            self.instances.lock().await.get(name).map(|i| i.state),
            Some(InstanceState::Running)
        )
    }

    pub async fn mark_gone(&self, name: &str) {
        if let Some(instance) = self.instances.lock().await.get_mut(name) {
            instance.state = InstanceState::Gone;
        }
    }

    /// Borrow the socket paths and mask for an attached agent/QMP client.
    pub async fn sockets_of(&self, name: &str) -> Option<SocketPaths> {
        self.instances.lock().await.get(name).map(|i| i.sockets.clone())
    }
}

async fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, child.wait()).await.is_ok()
}

async fn finish_stop(instance: &mut GuestInstance) {
    instance.state = InstanceState::Gone;
    for path in [&instance.sockets.monitor, &instance.sockets.serial, &instance.sockets.agent] {
        let _ = std::fs::remove_file(path);
    }
}

async fn read_all_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::new();
    };
    let mut buf = Vec::new();
    use tokio::io::AsyncReadExt;
    let _ = stderr.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
