/*!

The labelled scenarios. A [`Scenario`] is the context shared by every step of one run: the
settings, the [`Shell`] carrying the current kubeconfig, the [`Readiness`] used to wait for pods,
a staging directory for rendered manifests and the name of the last backup archive. Labels are run in the order they are given and
the first failing step aborts the run.

!*/

use crate::backup::{
    self, BACKUP_DONE, BACKUP_RESOURCE_NAME, RESTORE_DONE, RESTORE_RESOURCE_NAME,
};
use crate::cluster::{KubeReadiness, Readiness};
use crate::error::{self, Result};
use crate::exec::{Exec, Shell};
use crate::helm::Helm;
use crate::k3s;
use crate::kubectl::Kubectl;
use crate::manifest::{self, BACKUP_MANIFEST, RESTORE_MANIFEST, TOKEN_BACKUP_FILE, TOKEN_PRUNE};
use crate::settings::Settings;
use crate::stack;
use log::info;
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::Instant;

/// The name of a scenario, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    InstallK3s,
    InstallKubewarden,
    InstallBackupRestore,
    TestFullBackupRestore,
    TestSimpleBackupRestore,
}

derive_fromstr_from_deserialize!(Label);
derive_display_from_serialize!(Label);

impl Label {
    /// Every label, in the order a complete run executes them.
    pub const ALL: [Label; 5] = [
        Label::InstallK3s,
        Label::InstallKubewarden,
        Label::InstallBackupRestore,
        Label::TestFullBackupRestore,
        Label::TestSimpleBackupRestore,
    ];
}

pub struct Scenario {
    settings: Settings,
    shell: Shell,
    readiness: Arc<dyn Readiness>,
    staging: TempDir,
    backup_file: Option<String>,
}

impl Scenario {
    /// Create the context for a run. Commands use `kubeconfig` when given, otherwise
    /// `$HOME/.kube/config` if it exists, otherwise whatever `kubectl` and `helm` default to.
    pub fn new(settings: Settings, exec: Arc<dyn Exec>, kubeconfig: Option<PathBuf>) -> Result<Self> {
        let mut shell = Shell::new(exec, settings.sudo);
        let kubeconfig = kubeconfig.or_else(|| {
            k3s::local_kubeconfig()
                .ok()
                .filter(|path| path.is_file())
        });
        if let Some(kubeconfig) = kubeconfig {
            shell.set_kubeconfig(kubeconfig);
        }
        let staging = TempDir::new().context(error::FileSnafu {
            action: "create staging directory in",
            path: std::env::temp_dir(),
        })?;
        Ok(Self {
            settings,
            shell,
            readiness: Arc::new(KubeReadiness),
            staging,
            backup_file: None,
        })
    }

    /// Wait for pods with `readiness` instead of asking the Kubernetes API.
    pub fn with_readiness(mut self, readiness: Arc<dyn Readiness>) -> Self {
        self.readiness = readiness;
        self
    }

    /// The kubeconfig commands currently run against, if one was chosen.
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.shell.kubeconfig()
    }

    /// The archive produced by the last backup of this run.
    pub fn backup_file(&self) -> Option<&str> {
        self.backup_file.as_deref()
    }

    pub async fn run(&mut self, label: Label) -> Result<()> {
        info!("Running '{}'", label);
        match label {
            Label::InstallK3s => self.install_k3s().await,
            Label::InstallKubewarden => self.install_kubewarden().await,
            Label::InstallBackupRestore => self.install_backup_restore().await,
            Label::TestFullBackupRestore => self.test_full_backup_restore().await,
            Label::TestSimpleBackupRestore => self.test_simple_backup_restore().await,
        }?;
        info!("'{}' passed", label);
        Ok(())
    }

    /// Install and start K3s, wait for it, then point every later command at a copy of its
    /// kubeconfig in `$HOME/.kube/config`.
    pub async fn install_k3s(&mut self) -> Result<()> {
        k3s::install(&self.shell, &self.settings, self.staging.path()).await?;
        k3s::start(&self.shell).await?;
        k3s::wait_ready(self.readiness.as_ref(), &self.settings).await?;
        let kubeconfig = k3s::configure_kubeconfig(&self.settings).await?;
        self.shell.set_kubeconfig(kubeconfig);
        Ok(())
    }

    pub async fn install_kubewarden(&mut self) -> Result<()> {
        let kubeconfig = self.cluster_kubeconfig().to_path_buf();
        stack::install(
            &self.helm(),
            self.readiness.as_ref(),
            &self.settings,
            &kubeconfig,
            &stack::kubewarden(),
        )
        .await
    }

    pub async fn install_backup_restore(&mut self) -> Result<()> {
        stack::install_backup_operator(
            &self.helm(),
            self.readiness.as_ref(),
            &self.settings,
            &self.kubectl(),
        )
        .await
    }

    /// Back up, carry the archive over a reinstall of the whole cluster, and restore it into the
    /// fresh cluster.
    pub async fn test_full_backup_restore(&mut self) -> Result<()> {
        let file = self.backup().await?;

        let saved = self.settings.work_dir.join(&file);
        let storage = backup::backup_dir(&self.kubectl()).await?;
        self.shell
            .copy(&storage.join(&file), &self.settings.work_dir)
            .await?;
        info!("Saved '{}' to '{}'", file, saved.display());

        k3s::uninstall(&self.shell).await?;
        k3s::install(&self.shell, &self.settings, self.staging.path()).await?;
        self.shell
            .set_kubeconfig(self.settings.k3s_kubeconfig.clone());
        k3s::start(&self.shell).await?;
        k3s::wait_ready(self.readiness.as_ref(), &self.settings).await?;
        self.install_backup_restore().await?;

        let storage = backup::backup_dir(&self.kubectl()).await?;
        self.shell.copy(&saved, &storage).await?;
        info!("Copied '{}' into '{}'", file, storage.display());

        self.restore(&file, false).await
    }

    /// Back up, delete the Kubewarden objects the backup covers, restore with pruning and expect
    /// every deleted object back.
    pub async fn test_simple_backup_restore(&mut self) -> Result<()> {
        let file = self.backup().await?;

        let kubectl = self.kubectl();
        let namespace = self.settings.cluster_namespace.as_str();
        let mut deleted = Vec::new();
        for kind in &self.settings.restored_kinds {
            for name in kubectl.list_names(kind, namespace).await? {
                info!("Deleting {} '{}'", kind, name);
                kubectl.delete(kind, &name, namespace).await?;
                deleted.push((kind.as_str(), name));
            }
        }

        self.restore(&file, true).await?;

        for (kind, name) in &deleted {
            backup::wait_for_resource(&kubectl, &self.settings, kind, name, Some(namespace))
                .await?;
        }
        info!("{} deleted objects were restored", deleted.len());
        Ok(())
    }

    /// Apply the Backup, wait for the operator to finish it, and return the archive name. A Backup
    /// left by an earlier scenario is deleted first, so its status is not mistaken for this one.
    async fn backup(&mut self) -> Result<String> {
        let kubectl = self.kubectl();
        let manifest = manifest::stage(
            &self.settings.assets_dir,
            BACKUP_MANIFEST,
            self.staging.path(),
        )?;
        kubectl
            .delete_if_exists("backup", BACKUP_RESOURCE_NAME)
            .await?;
        let started = Instant::now();
        kubectl
            .apply(&self.settings.cluster_namespace, &manifest)
            .await?;
        backup::wait_for_resource(&kubectl, &self.settings, "backup", BACKUP_RESOURCE_NAME, None)
            .await?;
        backup::check_backup_restore(&kubectl, &self.settings, BACKUP_DONE, started).await?;

        let file = backup::backup_filename(&kubectl).await?;
        info!("Backup archive is '{}'", file);
        self.backup_file = Some(file.clone());
        Ok(file)
    }

    /// Render the Restore for `file`, apply it in place of any earlier Restore and wait for the
    /// operator to finish it.
    async fn restore(&self, file: &str, prune: bool) -> Result<()> {
        let kubectl = self.kubectl();
        let manifest = manifest::stage(
            &self.settings.assets_dir,
            RESTORE_MANIFEST,
            self.staging.path(),
        )?;
        manifest::sed(TOKEN_BACKUP_FILE, file, &manifest)?;
        manifest::sed(TOKEN_PRUNE, &prune.to_string(), &manifest)?;
        kubectl
            .delete_if_exists("restore", RESTORE_RESOURCE_NAME)
            .await?;
        let started = Instant::now();
        kubectl
            .apply(&self.settings.cluster_namespace, &manifest)
            .await?;
        backup::wait_for_resource(&kubectl, &self.settings, "restore", RESTORE_RESOURCE_NAME, None)
            .await?;
        backup::check_backup_restore(&kubectl, &self.settings, RESTORE_DONE, started).await
    }

    fn kubectl(&self) -> Kubectl {
        Kubectl::new(self.shell.clone(), self.settings.kubectl.as_str())
    }

    fn helm(&self) -> Helm {
        Helm::new(self.shell.clone(), self.settings.helm.as_str())
    }

    fn cluster_kubeconfig(&self) -> &Path {
        self.shell
            .kubeconfig()
            .unwrap_or(self.settings.k3s_kubeconfig.as_path())
    }
}
