/*!

Observing the rancher-backup operator: whether a backup or restore has finished, which archive a
backup produced, and where on the host the operator keeps its archives.

!*/

use crate::error::{self, Result};
use crate::kubectl::Kubectl;
use crate::settings::Settings;
use crate::stack::{BACKUP_NAMESPACE, BACKUP_SELECTOR};
use log::info;
use snafu::ensure;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

pub const BACKUP_RESOURCE_NAME: &str = "kubewarden-backup";
pub const RESTORE_RESOURCE_NAME: &str = "kubewarden-restore";

/// Logged by the operator once a backup archive has been written.
pub const BACKUP_DONE: &str = "Done with backup";
/// Logged by the operator once a restore has been applied.
pub const RESTORE_DONE: &str = "Done restoring";

const OPERATION_TIMEOUT: Duration = Duration::from_secs(300);
const OPERATION_INTERVAL: Duration = Duration::from_secs(10);

/// The name of the volume holding the archives in the operator pod.
const STORAGE_VOLUME: &str = "pv-storage";

/// Block until the operator logs contain `needle`. The logs are read in full on every poll, from
/// `started` on, so lines left by earlier operations are not seen.
pub async fn check_backup_restore(
    kubectl: &Kubectl,
    settings: &Settings,
    needle: &str,
    started: Instant,
) -> Result<()> {
    settings
        .poll(OPERATION_TIMEOUT, OPERATION_INTERVAL)
        .until_contains(&format!("'{}' in operator logs", needle), needle, move || {
            let since = log_window(started);
            async move { kubectl.logs(BACKUP_NAMESPACE, BACKUP_SELECTOR, &since).await }
        })
        .await?;
    info!("Operator logged '{}'", needle);
    Ok(())
}

/// Block until `kubectl get <kind> <name>` reports the object's name. Namespaced kinds need
/// their `namespace`; it is ignored for cluster-scoped kinds.
pub async fn wait_for_resource(
    kubectl: &Kubectl,
    settings: &Settings,
    kind: &str,
    name: &str,
    namespace: Option<&str>,
) -> Result<()> {
    settings
        .poll(OPERATION_TIMEOUT, OPERATION_INTERVAL)
        .until_contains(&format!("{} '{}'", kind, name), name, move || {
            kubectl.get_jsonpath(kind, name, namespace, "{.metadata.name}")
        })
        .await?;
    Ok(())
}

/// The archive name the operator recorded in the status of the `kubewarden-backup` Backup.
pub async fn backup_filename(kubectl: &Kubectl) -> Result<String> {
    let filename = kubectl
        .get_jsonpath("backup", BACKUP_RESOURCE_NAME, None, "{.status.filename}")
        .await?
        .trim()
        .to_string();
    ensure!(
        !filename.is_empty(),
        error::EmptySnafu {
            what: "the backup filename"
        }
    );
    Ok(filename)
}

/// The directory on the host where the operator stores its archives: operator pod, to its
/// persistent volume claim, to the bound volume, to the volume's path on the node.
pub async fn backup_dir(kubectl: &Kubectl) -> Result<PathBuf> {
    let claim_path = format!(
        "jsonpath={{.items[*].spec.volumes[?(@.name==\"{}\")].persistentVolumeClaim.claimName}}",
        STORAGE_VOLUME
    );
    let claim = kubectl
        .run([
            "get",
            "pod",
            "--namespace",
            BACKUP_NAMESPACE,
            "-l",
            BACKUP_SELECTOR,
            "-o",
            claim_path.as_str(),
        ])
        .await?;
    let claim = non_empty(claim, "the operator volume claim")?;

    let volume = kubectl
        .get_jsonpath("pvc", &claim, Some(BACKUP_NAMESPACE), "{.spec.volumeName}")
        .await?;
    let volume = non_empty(volume, "the operator persistent volume")?;

    // local-path volumes are either `local` or `hostPath` depending on the provisioner version.
    let path = kubectl
        .get_jsonpath("pv", &volume, None, "{.spec.local.path}{.spec.hostPath.path}")
        .await?;
    let path = non_empty(path, "the operator storage path")?;
    info!("Backups are stored in '{}'", path);
    Ok(PathBuf::from(path))
}

/// The `--since` value covering everything logged after `started`, rounded up to whole seconds.
fn log_window(started: Instant) -> String {
    format!("{}s", started.elapsed().as_secs() + 1)
}

fn non_empty(value: String, what: &str) -> Result<String> {
    let value = value.trim();
    ensure!(!value.is_empty(), error::EmptySnafu { what });
    Ok(value.to_string())
}
