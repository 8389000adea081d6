use crate::error::{self, Result};
use crate::poll::Poll;
use serde::Deserialize;
use snafu::ResultExt;
use std::path::PathBuf;
use std::time::Duration;

/// The prefix of every environment variable read into [`Settings`].
pub const ENV_PREFIX: &str = "E2E_";

/// Settings provide a way to tune the harness through environment variables. Every field has a
/// default, so an empty environment yields a usable configuration.
///
/// # Example
///
/// ```text
/// E2E_TIMEOUT_SCALE=3 E2E_K3S_VERSION=v1.28.5+k3s1 backup-restore-e2e run install-k3s
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Multiplier applied to every poll timeout. Slow hosts (nested virtualization, shared CI
    /// runners) can raise it instead of editing the timeouts.
    #[serde(default = "one")]
    pub timeout_scale: u32,

    /// The path or name of the `kubectl` binary.
    #[serde(default = "kubectl")]
    pub kubectl: String,

    /// The path or name of the `helm` binary.
    #[serde(default = "helm")]
    pub helm: String,

    /// Where the K3s installer script is downloaded from.
    #[serde(default = "k3s_install_url")]
    pub k3s_install_url: String,

    /// A local K3s installer script. When set, nothing is downloaded (air-gapped hosts).
    pub k3s_install_script: Option<PathBuf>,

    /// Passed to the installer as `INSTALL_K3S_VERSION`. The installer picks the stable channel
    /// when unset.
    pub k3s_version: Option<String>,

    /// Passed to the installer as `INSTALL_K3S_EXEC`. The default makes the K3s kubeconfig
    /// readable without root.
    #[serde(default = "k3s_exec")]
    pub k3s_exec: Option<String>,

    /// The kubeconfig written by K3s.
    #[serde(default = "k3s_kubeconfig")]
    pub k3s_kubeconfig: PathBuf,

    /// Directory holding the manifest templates.
    #[serde(default = "assets_dir")]
    pub assets_dir: PathBuf,

    /// Directory the backup archive is copied to while the cluster is reinstalled.
    #[serde(default = "work_dir")]
    pub work_dir: PathBuf,

    /// Namespace the Backup and Restore manifests are applied to.
    #[serde(default = "cluster_namespace")]
    pub cluster_namespace: String,

    /// Prefix host file operations on root-owned paths with `sudo`.
    #[serde(default = "yes")]
    pub sudo: bool,

    /// Kinds that the simple scenario deletes before restoring, then expects back.
    #[serde(default = "restored_kinds")]
    pub restored_kinds: Vec<String>,
}

impl Settings {
    /// Read the settings from `E2E_*` environment variables.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<Settings>()
            .context(error::SettingsSnafu)
    }

    /// A [`Poll`] whose timeout is stretched by `timeout_scale`.
    pub fn poll(&self, timeout: Duration, interval: Duration) -> Poll {
        Poll::scaled(timeout, interval, self.timeout_scale)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_scale: one(),
            kubectl: kubectl(),
            helm: helm(),
            k3s_install_url: k3s_install_url(),
            k3s_install_script: None,
            k3s_version: None,
            k3s_exec: k3s_exec(),
            k3s_kubeconfig: k3s_kubeconfig(),
            assets_dir: assets_dir(),
            work_dir: work_dir(),
            cluster_namespace: cluster_namespace(),
            sudo: yes(),
            restored_kinds: restored_kinds(),
        }
    }
}

// We need these to provide defaults for serde.

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

fn kubectl() -> String {
    String::from("kubectl")
}

fn helm() -> String {
    String::from("helm")
}

fn k3s_install_url() -> String {
    String::from("https://get.k3s.io")
}

fn k3s_exec() -> Option<String> {
    Some(String::from("--write-kubeconfig-mode 644"))
}

fn k3s_kubeconfig() -> PathBuf {
    PathBuf::from("/etc/rancher/k3s/k3s.yaml")
}

fn assets_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets")
}

fn work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn cluster_namespace() -> String {
    String::from("kubewarden")
}

fn restored_kinds() -> Vec<String> {
    vec![
        String::from("ClusterAdmissionPolicy"),
        String::from("PolicyServer"),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let settings: Settings = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(settings.timeout_scale, 1);
        assert_eq!(settings.kubectl, "kubectl");
        assert_eq!(settings.cluster_namespace, "kubewarden");
        assert!(settings.sudo);
        assert!(settings.k3s_version.is_none());
        assert_eq!(
            settings.k3s_exec.as_deref(),
            Some("--write-kubeconfig-mode 644")
        );
        assert_eq!(
            settings.restored_kinds,
            vec!["ClusterAdmissionPolicy", "PolicyServer"]
        );
        assert!(settings.assets_dir.join("backup.yaml").is_file());
    }

    #[test]
    fn overrides_from_environment() {
        let settings: Settings = envy::from_iter(vec![
            ("TIMEOUT_SCALE".to_string(), "3".to_string()),
            ("SUDO".to_string(), "false".to_string()),
            ("K3S_VERSION".to_string(), "v1.28.5+k3s1".to_string()),
            ("RESTORED_KINDS".to_string(), "PolicyServer".to_string()),
        ])
        .unwrap();
        assert_eq!(settings.timeout_scale, 3);
        assert!(!settings.sudo);
        assert_eq!(settings.k3s_version.as_deref(), Some("v1.28.5+k3s1"));
        assert_eq!(settings.restored_kinds, vec!["PolicyServer"]);
    }

    #[test]
    fn poll_is_scaled() {
        let settings = Settings {
            timeout_scale: 4,
            ..Default::default()
        };
        let poll = settings.poll(Duration::from_secs(30), Duration::from_secs(2));
        assert_eq!(poll.timeout(), Duration::from_secs(120));
        assert_eq!(poll.interval(), Duration::from_secs(2));
    }
}
