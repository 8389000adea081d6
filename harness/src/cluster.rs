use crate::error::{self, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::ListParams,
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use snafu::ResultExt;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Pods that must be up before a component counts as started, selected by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodCheck {
    pub namespace: &'static str,
    pub selector: &'static str,
}

impl PodCheck {
    pub const fn new(namespace: &'static str, selector: &'static str) -> Self {
        Self {
            namespace,
            selector,
        }
    }
}

impl Display for PodCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pods '{}' in '{}'", self.selector, self.namespace)
    }
}

/// Answers whether the pods of a component are up. Scenarios only observe pods through this trait,
/// so the cluster can be replaced in tests.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Returns `true` when every check in `checks` is satisfied in the cluster of `kubeconfig`.
    async fn pods_ready(&self, kubeconfig: &Path, checks: &[PodCheck]) -> Result<bool>;
}

/// Checks pods through the Kubernetes API. A client is created for every check because the
/// kubeconfig may not exist yet, or may belong to a cluster that was just reinstalled.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeReadiness;

#[async_trait]
impl Readiness for KubeReadiness {
    async fn pods_ready(&self, kubeconfig: &Path, checks: &[PodCheck]) -> Result<bool> {
        let client = k8s_client(kubeconfig).await?;
        pods_ready(&client, checks).await
    }
}

/// Create the k8s client for the cluster described by `kubeconfig`.
pub async fn k8s_client(kubeconfig: &Path) -> Result<Client> {
    let config = Kubeconfig::read_from(kubeconfig).context(error::ConfigReadSnafu {
        path: kubeconfig,
    })?;
    let config = Config::from_custom_kubeconfig(config, &KubeConfigOptions::default())
        .await
        .context(error::ClientCreateSnafu)?;
    config.try_into().context(error::KubeSnafu {
        action: "create client from kubeconfig",
    })
}

/// Returns `true` when every check matches at least one pod and every matched pod is running (or
/// has already completed).
pub async fn pods_ready(client: &Client, checks: &[PodCheck]) -> Result<bool> {
    for check in checks {
        let pod_api = Api::<Pod>::namespaced(client.clone(), check.namespace);
        let pods = pod_api
            .list(&ListParams {
                label_selector: Some(check.selector.to_string()),
                ..Default::default()
            })
            .await
            .context(error::KubeSnafu {
                action: format!("list {}", check),
            })?;
        if pods.items.is_empty() || !pods.items.iter().all(is_up) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_up(pod: &Pod) -> bool {
    matches!(
        pod.status
            .as_ref()
            .and_then(|status| status.phase.as_deref()),
        Some("Running") | Some("Succeeded")
    )
}


#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;

    fn pod(phase: Option<&str>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: phase.map(String::from),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn running_and_completed_pods_are_up() {
        assert!(is_up(&pod(Some("Running"))));
        assert!(is_up(&pod(Some("Succeeded"))));
        assert!(!is_up(&pod(Some("Pending"))));
        assert!(!is_up(&pod(None)));
        assert!(!is_up(&Pod::default()));
    }

    #[test]
    fn check_display() {
        let check = PodCheck::new("kube-system", "k8s-app=kube-dns");
        assert_eq!(check.to_string(), "pods 'k8s-app=kube-dns' in 'kube-system'");
    }
}
