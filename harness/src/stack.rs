use crate::cluster::{PodCheck, Readiness};
use crate::error::Result;
use crate::helm::{Chart, Helm};
use crate::kubectl::Kubectl;
use crate::manifest::RESOURCE_SET_MANIFEST;
use crate::settings::Settings;
use log::info;
use std::path::Path;
use std::time::Duration;

pub const KUBEWARDEN_NAMESPACE: &str = "kubewarden";
pub const BACKUP_NAMESPACE: &str = "cattle-resources-system";
pub const BACKUP_SELECTOR: &str = "app.kubernetes.io/name=rancher-backup";

const PODS_TIMEOUT: Duration = Duration::from_secs(300);
const PODS_INTERVAL: Duration = Duration::from_secs(5);

/// A set of helm releases installed together from one chart repository.
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: &'static str,
    pub repo_name: &'static str,
    pub repo_url: &'static str,
    /// Installed in order; later charts may need the CRDs of earlier ones.
    pub charts: Vec<Chart>,
    /// Pods that have to run once the charts are installed.
    pub pods: Vec<PodCheck>,
}

/// The Kubewarden policy engine: CRDs, controller and the default policy server.
pub fn kubewarden() -> Stack {
    Stack {
        name: "Kubewarden",
        repo_name: "kubewarden",
        repo_url: "https://charts.kubewarden.io",
        charts: vec![
            Chart::new(
                "kubewarden-crds",
                "kubewarden/kubewarden-crds",
                KUBEWARDEN_NAMESPACE,
            )
            .create_namespace(),
            Chart::new(
                "kubewarden-controller",
                "kubewarden/kubewarden-controller",
                KUBEWARDEN_NAMESPACE,
            ),
            Chart::new(
                "kubewarden-defaults",
                "kubewarden/kubewarden-defaults",
                KUBEWARDEN_NAMESPACE,
            ),
        ],
        pods: vec![PodCheck::new(
            KUBEWARDEN_NAMESPACE,
            "app.kubernetes.io/name=kubewarden-controller",
        )],
    }
}

/// The rancher-backup operator, storing its archives on a local-path persistent volume so they
/// can be picked up from the host.
pub fn backup_operator() -> Stack {
    Stack {
        name: "rancher-backup operator",
        repo_name: "rancher-charts",
        repo_url: "https://charts.rancher.io",
        charts: vec![
            Chart::new(
                "rancher-backup-crd",
                "rancher-charts/rancher-backup-crd",
                BACKUP_NAMESPACE,
            )
            .create_namespace(),
            Chart::new(
                "rancher-backup",
                "rancher-charts/rancher-backup",
                BACKUP_NAMESPACE,
            )
            .set("persistence.enabled", "true")
            .set("persistence.storageClass", "local-path"),
        ],
        pods: vec![PodCheck::new(BACKUP_NAMESPACE, BACKUP_SELECTOR)],
    }
}

/// Install every chart of `stack` and wait for its pods, observed through `kubeconfig`. The first
/// failing chart aborts the install.
pub async fn install(
    helm: &Helm,
    readiness: &dyn Readiness,
    settings: &Settings,
    kubeconfig: &Path,
    stack: &Stack,
) -> Result<()> {
    install_charts(helm, stack).await?;
    wait_for_pods(readiness, settings, kubeconfig, &stack.pods).await?;
    info!("{} is installed", stack.name);
    Ok(())
}

/// Install the backup operator and the `ResourceSet` describing what a backup contains.
pub async fn install_backup_operator(
    helm: &Helm,
    readiness: &dyn Readiness,
    settings: &Settings,
    kubectl: &Kubectl,
) -> Result<()> {
    let kubeconfig = kubectl
        .shell()
        .kubeconfig()
        .unwrap_or(settings.k3s_kubeconfig.as_path());
    install(helm, readiness, settings, kubeconfig, &backup_operator()).await?;
    kubectl
        .apply(
            BACKUP_NAMESPACE,
            &settings.assets_dir.join(RESOURCE_SET_MANIFEST),
        )
        .await
}

async fn install_charts(helm: &Helm, stack: &Stack) -> Result<()> {
    info!("Installing {}", stack.name);
    helm.repo_add(stack.repo_name, stack.repo_url).await?;
    helm.repo_update().await?;
    for chart in &stack.charts {
        info!("Installing chart '{}'", chart.chart);
        helm.upgrade_install(chart).await?;
    }
    Ok(())
}

async fn wait_for_pods(
    readiness: &dyn Readiness,
    settings: &Settings,
    kubeconfig: &Path,
    pods: &[PodCheck],
) -> Result<()> {
    let what = pods
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    settings
        .poll(PODS_TIMEOUT, PODS_INTERVAL)
        .until(&what, move || async move {
            readiness
                .pods_ready(kubeconfig, pods)
                .await
                .map(|ready| ready.then_some(()))
        })
        .await
}
