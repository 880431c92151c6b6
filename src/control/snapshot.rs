//! Snapshot Manager (§4.4): restores clean guest state between tasks.

use crate::control::qmp::QmpClient;
use crate::error::{Error, Result};
use crate::vmm::Supervisor;

/// Issues `loadvm <snapshot_name>` against the instance's monitor socket.
/// On failure the instance is marked `gone` so the next launch starts fresh
/// (§4.4: "the task fails with SnapshotRestoreFailed and the instance is
/// marked gone to force a fresh launch").
pub async fn restore(supervisor: &Supervisor, instance_name: &str, snapshot_name: &str) -> Result<()> {
    let Some(sockets) = supervisor.sockets_of(instance_name).await else {
        return Err(Error::GuestDied {
            instance: instance_name.to_string(),
            detail: "instance not found when restoring snapshot".into(),
        });
    };

    let restore_result = async {
        let mut qmp = QmpClient::connect(&sockets.monitor).await?;
        qmp.handshake().await?;
        qmp.loadvm(snapshot_name).await
    }
    .await;

    if let Err(e) = restore_result {
        supervisor.mark_gone(instance_name).await;
        return Err(Error::SnapshotRestoreFailed {
            instance: instance_name.to_string(),
            snapshot: snapshot_name.to_string(),
            detail: e.to_string(),
        });
    }
    Ok(())
}
