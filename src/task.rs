//! AnalysisTask orchestration (§2 control flow): ties the Supervisor,
//! snapshot restore, agent RPC client, and scorer into the single
//! submit-a-file-get-a-verdict operation the rest of the crate exists for.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use sandtrap_protocol::{AnalysisReport, Verdict};

use crate::agent_client::AgentClient;
use crate::config::Config;
use crate::control::snapshot;
use crate::error::{Error, Result};
use crate::profile::{GuestProfile, HardwareMask};
use crate::scorer::{self, StaticEvidence};
use crate::vmm::Supervisor;

/// Everything a caller needs to submit one sample for analysis (§6:
/// "Sample source hands the core a local-filesystem path and an optional
/// architecture hint").
pub struct AnalysisRequest {
    pub instance_name: String,
    pub sample_path: std::path::PathBuf,
    pub static_evidence: StaticEvidence,
}

pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub verdict: Verdict,
}

/// Drives one request end to end against an already-launched instance
/// (§2): restore snapshot, stage the sample, run `analyze`, score the
/// result, leave the guest on a clean snapshot for the next task.
pub struct AnalysisTask<'a> {
    supervisor: &'a Supervisor,
    config: &'a Config,
}

impl<'a> AnalysisTask<'a> {
    pub fn new(supervisor: &'a Supervisor, config: &'a Config) -> Self {
        AnalysisTask { supervisor, config }
    }

    /// Ensures an instance named `profile.name` is running, building a fresh
    /// `HardwareMask` only on first launch (§3: masks persist with the
    /// instance, not regenerated per task).
    pub async fn ensure_launched(&self, profile: GuestProfile, mask: HardwareMask) -> Result<()> {
        if self.supervisor.is_running(&profile.name).await {
            return Ok(());
        }
        self.supervisor.launch(profile, mask).await
    }

    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisOutcome> {
        let sockets = self
            .supervisor
            .sockets_of(&request.instance_name)
            .await
            .ok_or_else(|| Error::GuestDied {
                instance: request.instance_name.clone(),
                detail: "instance not running when task started".into(),
            })?;

        let snapshot_name = self
            .config
            .architectures
            .values()
            .next()
            .map(|a| a.snapshot.clone())
            .unwrap_or_else(|| "clean".to_string());

        snapshot::restore(self.supervisor, &request.instance_name, &snapshot_name).await?;

        let file_hash = hash_file(&request.sample_path)?;
        let data = std::fs::read(&request.sample_path).map_err(Error::Io)?;
        let guest_path = format!("/tmp/{file_hash}");

        let client = Arc::new(AgentClient::new(request.instance_name.clone(), sockets.agent.clone()));

        client.ping().await?;

        let write_response = client.write_file(&guest_path, &data, 0o755).await?;
        if !write_response.success {
            return Err(Error::AgentUnreachable {
                instance: request.instance_name.clone(),
                detail: write_response.error.unwrap_or_else(|| "write_file failed".into()),
            });
        }

        let task_timeout = Duration::from_secs(self.config.timeouts.analysis_secs);
        let started = Instant::now();
        let report = client.analyze(&guest_path, task_timeout).await?;

        if started.elapsed() > task_timeout + Duration::from_secs(2) {
            warn!(instance = %request.instance_name, "analyze exceeded its wall-clock bound");
        }

        info!(
            instance = %request.instance_name,
            file_hash = %file_hash,
            success = report.success,
            "analysis complete"
        );

        let verdict = scorer::score(
            &report,
            &request.static_evidence,
            self.config.thresholds.clean,
            self.config.thresholds.suspicious,
        );

        // Leave the guest on a clean snapshot for whichever task comes next
        // (§2: "snapshot is restored for the next task").
        if let Err(e) = snapshot::restore(self.supervisor, &request.instance_name, &snapshot_name).await {
            warn!(instance = %request.instance_name, error = %e, "post-task snapshot restore failed");
        }

        Ok(AnalysisOutcome { report, verdict })
    }
}

fn hash_file(path: &std::path::Path) -> Result<String> {
    let data = std::fs::read(path).map_err(Error::Io)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_is_stable_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.py");
        std::fs::write(&path, b"print(\"hello\")\n").unwrap();
        let hash = hash_file(&path).unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_file(&path).unwrap());
    }
}
