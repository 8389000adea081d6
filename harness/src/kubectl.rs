use crate::error::Result;
use crate::exec::{path_arg, CommandLine, Shell};
use std::path::Path;

/// A thin wrapper over the `kubectl` binary. Every method is a single invocation whose exit status
/// decides success; the kubeconfig comes from the [`Shell`].
#[derive(Clone)]
pub struct Kubectl {
    shell: Shell,
    program: String,
}

impl Kubectl {
    pub fn new<S: Into<String>>(shell: Shell, program: S) -> Self {
        Self {
            shell,
            program: program.into(),
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Run `kubectl` with `args` and return stdout.
    pub async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell
            .run(CommandLine::new(self.program.as_str()).args(args))
            .await
    }

    /// `kubectl apply` the manifest at `path` into `namespace`.
    pub async fn apply(&self, namespace: &str, path: &Path) -> Result<()> {
        let path = path_arg(path);
        self.run(["apply", "--namespace", namespace, "-f", path.as_str()])
            .await
            .map(|_| ())
    }

    /// Evaluate the jsonpath expression `path` against the object `kind/name`.
    pub async fn get_jsonpath(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        path: &str,
    ) -> Result<String> {
        let mut args = vec!["get".to_string(), kind.to_string(), name.to_string()];
        if let Some(namespace) = namespace {
            args.extend(["--namespace".to_string(), namespace.to_string()]);
        }
        args.extend(["-o".to_string(), format!("jsonpath={}", path)]);
        self.run(args).await
    }

    /// The names of every `kind` object in `namespace`.
    pub async fn list_names(&self, kind: &str, namespace: &str) -> Result<Vec<String>> {
        let names = self
            .run([
                "get",
                kind,
                "--namespace",
                namespace,
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
            .await?;
        Ok(split_names(&names))
    }

    pub async fn delete(&self, kind: &str, name: &str, namespace: &str) -> Result<()> {
        self.run(["delete", kind, "--namespace", namespace, name])
            .await
            .map(|_| ())
    }

    /// Delete the cluster-scoped object `kind/name` if there is one.
    pub async fn delete_if_exists(&self, kind: &str, name: &str) -> Result<()> {
        self.run(["delete", kind, name, "--ignore-not-found"])
            .await
            .map(|_| ())
    }

    /// The logs of every pod matching `selector`, from the last `since` (e.g. `5m`).
    pub async fn logs(&self, namespace: &str, selector: &str, since: &str) -> Result<String> {
        let since = format!("--since={}", since);
        self.run([
            "logs",
            "--namespace",
            namespace,
            "-l",
            selector,
            "--tail=-1",
            since.as_str(),
        ])
        .await
    }
}

/// Split a whitespace separated jsonpath list. An empty list yields no names.
pub(crate) fn split_names(list: &str) -> Vec<String> {
    list.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exec::test_support::ScriptedExec;

    fn kubectl(exec: std::sync::Arc<ScriptedExec>) -> Kubectl {
        Kubectl::new(Shell::new(exec, true), "kubectl")
    }

    #[tokio::test]
    async fn builds_command_lines() {
        let exec = ScriptedExec::new();
        let k = kubectl(exec.clone());
        k.apply("kubewarden", Path::new("/tmp/backup.yaml"))
            .await
            .unwrap();
        k.get_jsonpath("backup", "kubewarden-backup", None, "{.status.filename}")
            .await
            .unwrap();
        k.get_jsonpath("pvc", "data", Some("cattle-resources-system"), "{.spec.volumeName}")
            .await
            .unwrap();
        k.delete("PolicyServer", "default", "kubewarden")
            .await
            .unwrap();
        k.delete_if_exists("restore", "kubewarden-restore")
            .await
            .unwrap();
        k.logs(
            "cattle-resources-system",
            "app.kubernetes.io/name=rancher-backup",
            "5m",
        )
        .await
        .unwrap();
        assert_eq!(
            exec.lines(),
            vec![
                "kubectl apply --namespace kubewarden -f /tmp/backup.yaml",
                "kubectl get backup kubewarden-backup -o jsonpath={.status.filename}",
                "kubectl get pvc data --namespace cattle-resources-system -o jsonpath={.spec.volumeName}",
                "kubectl delete PolicyServer --namespace kubewarden default",
                "kubectl delete restore kubewarden-restore --ignore-not-found",
                "kubectl logs --namespace cattle-resources-system -l app.kubernetes.io/name=rancher-backup --tail=-1 --since=5m",
            ]
        );
    }

    #[tokio::test]
    async fn empty_list_has_no_names() {
        let exec = ScriptedExec::new();
        exec.reply("get PolicyServer", "default strict");
        let k = kubectl(exec.clone());
        assert_eq!(
            k.list_names("PolicyServer", "kubewarden").await.unwrap(),
            vec!["default", "strict"]
        );
        assert!(k
            .list_names("ClusterAdmissionPolicy", "kubewarden")
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn split_ignores_extra_whitespace() {
        assert_eq!(split_names(" a  b\n"), vec!["a", "b"]);
        assert!(split_names("").is_empty());
    }
}
