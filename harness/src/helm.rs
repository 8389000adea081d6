use crate::error::Result;
use crate::exec::{CommandLine, Shell};

/// A chart release to install with `helm upgrade --install`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    /// The release name.
    pub release: String,
    /// The chart reference, `<repo>/<chart>`.
    pub chart: String,
    pub namespace: String,
    pub create_namespace: bool,
    pub version: Option<String>,
    /// `--set` values, in order.
    pub values: Vec<(String, String)>,
}

impl Chart {
    pub fn new<S1, S2, S3>(release: S1, chart: S2, namespace: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            release: release.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            create_namespace: false,
            version: None,
            values: Vec::new(),
        }
    }

    pub fn create_namespace(mut self) -> Self {
        self.create_namespace = true;
        self
    }

    pub fn set<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Arguments of `helm upgrade --install` for this release. `--wait` makes helm block until
    /// the release's workloads are ready.
    pub fn upgrade_args(&self) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            "--wait".to_string(),
            "--namespace".to_string(),
            self.namespace.clone(),
        ];
        if self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(version) = &self.version {
            args.extend(["--version".to_string(), version.clone()]);
        }
        for (key, value) in &self.values {
            args.extend(["--set".to_string(), format!("{}={}", key, value)]);
        }
        args.extend([self.release.clone(), self.chart.clone()]);
        args
    }
}

/// A thin wrapper over the `helm` binary.
#[derive(Clone)]
pub struct Helm {
    shell: Shell,
    program: String,
}

impl Helm {
    pub fn new<S: Into<String>>(shell: Shell, program: S) -> Self {
        Self {
            shell,
            program: program.into(),
        }
    }

    pub async fn repo_add(&self, name: &str, url: &str) -> Result<()> {
        self.run(vec![
            "repo".to_string(),
            "add".to_string(),
            "--force-update".to_string(),
            name.to_string(),
            url.to_string(),
        ])
        .await
    }

    pub async fn repo_update(&self) -> Result<()> {
        self.run(vec!["repo".to_string(), "update".to_string()])
            .await
    }

    pub async fn upgrade_install(&self, chart: &Chart) -> Result<()> {
        self.run(chart.upgrade_args()).await
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        self.shell
            .run(CommandLine::new(self.program.as_str()).args(args))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exec::test_support::ScriptedExec;

    #[test]
    fn upgrade_args_in_order() {
        let mut chart = Chart::new(
            "rancher-backup",
            "rancher-charts/rancher-backup",
            "cattle-resources-system",
        )
        .create_namespace()
        .set("persistence.enabled", "true")
        .set("persistence.storageClass", "local-path");
        chart.version = Some("103.0.0".to_string());
        assert_eq!(
            chart.upgrade_args().join(" "),
            "upgrade --install --wait --namespace cattle-resources-system --create-namespace \
             --version 103.0.0 --set persistence.enabled=true \
             --set persistence.storageClass=local-path rancher-backup rancher-charts/rancher-backup"
        );
    }

    #[tokio::test]
    async fn failing_install_is_an_error() {
        let exec = ScriptedExec::new();
        exec.fail("kubewarden-controller", "Error: timed out waiting for the condition");
        let helm = Helm::new(Shell::new(exec.clone(), true), "helm");
        helm.repo_add("kubewarden", "https://charts.kubewarden.io")
            .await
            .unwrap();
        let err = helm
            .upgrade_install(&Chart::new(
                "kubewarden-controller",
                "kubewarden/kubewarden-controller",
                "kubewarden",
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out waiting for the condition"));
        assert_eq!(
            exec.lines()[0],
            "helm repo add --force-update kubewarden https://charts.kubewarden.io"
        );
    }
}
