/*!

The lifecycle of the K3s cluster the scenarios run against: install, start, wait until the API
server answers, uninstall, and hand the kubeconfig over to the rest of the tooling.

!*/

use crate::cluster::{PodCheck, Readiness};
use crate::error::{self, Result};
use crate::exec::{path_arg, CommandLine, Shell};
use crate::settings::Settings;
use log::info;
use snafu::{ensure, OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The name the installer script is downloaded under.
pub const INSTALLER_NAME: &str = "k3s-install.sh";

/// The uninstall script the installer leaves on the host.
pub const UNINSTALLER: &str = "k3s-uninstall.sh";

/// The system pods that have to run before the cluster is usable.
pub const SYSTEM_PODS: [PodCheck; 2] = [
    PodCheck::new("kube-system", "k8s-app=kube-dns"),
    PodCheck::new("kube-system", "app=local-path-provisioner"),
];

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_INTERVAL: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(300);
const READY_INTERVAL: Duration = Duration::from_secs(5);

/// Install K3s without starting it. The installer is taken from `k3s_install_script` when set,
/// otherwise it is downloaded into `dir`.
pub async fn install(shell: &Shell, settings: &Settings, dir: &Path) -> Result<()> {
    let script = match &settings.k3s_install_script {
        Some(script) => script.clone(),
        None => download_installer(shell, settings, dir).await?,
    };
    info!("Installing K3s with '{}'", script.display());
    shell.run(installer_command(settings, &script)).await?;
    Ok(())
}

pub async fn start(shell: &Shell) -> Result<()> {
    info!("Starting K3s");
    shell
        .run(shell.privileged(CommandLine::new("systemctl").args(["start", "k3s"])))
        .await?;
    Ok(())
}

/// Block until the K3s system pods are running. The kubeconfig may not have been written yet
/// when this is called, so a failing check is retried like a negative one.
pub async fn wait_ready(readiness: &dyn Readiness, settings: &Settings) -> Result<()> {
    let kubeconfig = settings.k3s_kubeconfig.as_path();
    settings
        .poll(READY_TIMEOUT, READY_INTERVAL)
        .until("K3s system pods", move || async move {
            readiness
                .pods_ready(kubeconfig, &SYSTEM_PODS)
                .await
                .map(|ready| ready.then_some(()))
        })
        .await?;
    info!("K3s is up");
    Ok(())
}

pub async fn uninstall(shell: &Shell) -> Result<()> {
    info!("Uninstalling K3s");
    shell
        .run(shell.privileged(CommandLine::new(UNINSTALLER)))
        .await?;
    Ok(())
}

/// Copy the kubeconfig written by K3s to `$HOME/.kube/config` and return that path.
pub async fn configure_kubeconfig(settings: &Settings) -> Result<PathBuf> {
    let source = settings.k3s_kubeconfig.as_path();
    ensure!(
        source.is_file(),
        error::MissingFileSnafu { path: source }
    );
    let local = local_kubeconfig()?;
    if let Some(dir) = local.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .context(error::FileSnafu {
                action: "create directory",
                path: dir,
            })?;
    }
    tokio::fs::copy(source, &local)
        .await
        .context(error::FileSnafu {
            action: "copy kubeconfig to",
            path: &local,
        })?;
    info!("Copied '{}' to '{}'", source.display(), local.display());
    Ok(local)
}

/// `$HOME/.kube/config`
pub fn local_kubeconfig() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context(error::MissingHomeSnafu)?;
    Ok(PathBuf::from(home).join(".kube").join("config"))
}

async fn download_installer(shell: &Shell, settings: &Settings, dir: &Path) -> Result<PathBuf> {
    let script = dir.join(INSTALLER_NAME);
    let curl = CommandLine::new("curl")
        .args(["-sfL", settings.k3s_install_url.as_str(), "-o"])
        .arg(path_arg(&script));
    settings
        .poll(DOWNLOAD_TIMEOUT, DOWNLOAD_INTERVAL)
        .until("K3s installer download", move || {
            let curl = curl.clone();
            async move { shell.run(curl).await.map(|_| Some(())) }
        })
        .await?;
    Ok(script)
}

fn installer_command(settings: &Settings, script: &Path) -> CommandLine {
    let mut command = CommandLine::new("sh")
        .arg(path_arg(script))
        .env("INSTALL_K3S_SKIP_START", "true");
    if let Some(version) = &settings.k3s_version {
        command = command.env("INSTALL_K3S_VERSION", version.as_str());
    }
    if let Some(exec) = &settings.k3s_exec {
        command = command.env("INSTALL_K3S_EXEC", exec.as_str());
    }
    command
}
