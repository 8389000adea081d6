use crate::error::{self, Result};
use async_trait::async_trait;
use log::{debug, trace};
use snafu::ResultExt;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A command line to run on the host: a program, its arguments and extra environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandLine {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// The exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, the way a terminal would have shown them.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs command lines. The harness only talks to the host through this trait, which lets the
/// orchestration steps be exercised without a cluster.
#[async_trait]
pub trait Exec: Send + Sync {
    async fn exec(&self, command: &CommandLine) -> Result<Output>;
}

/// Runs command lines as child processes of the harness.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostExec;

#[async_trait]
impl Exec for HostExec {
    async fn exec(&self, command: &CommandLine) -> Result<Output> {
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await
            .context(error::SpawnSnafu {
                command: command.to_string(),
            })?;
        Ok(Output {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The handle every step uses to run commands. It owns the kubeconfig override: every command
/// is started with `KUBECONFIG` pointing at the current kubeconfig, so switching clusters mid-run
/// is a matter of calling [`Shell::set_kubeconfig`].
#[derive(Clone)]
pub struct Shell {
    exec: Arc<dyn Exec>,
    kubeconfig: Option<PathBuf>,
    sudo: bool,
}

impl Shell {
    pub fn new(exec: Arc<dyn Exec>, sudo: bool) -> Self {
        Self {
            exec,
            kubeconfig: None,
            sudo,
        }
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    pub fn set_kubeconfig<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        debug!("Using kubeconfig '{}'", path.display());
        self.kubeconfig = Some(path);
    }

    /// Run `command` and return its stdout. A non-zero exit status is an error.
    pub async fn run(&self, command: CommandLine) -> Result<String> {
        let command = self.with_kubeconfig(command);
        let output = self.output_of(&command).await?;
        if !output.success() {
            return error::CommandFailedSnafu {
                command: command.to_string(),
                code: output.code.unwrap_or(1),
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .fail();
        }
        Ok(output.stdout)
    }

    /// Copy a file with `cp`, through `sudo` unless it was disabled. The operator's storage
    /// directory belongs to root.
    pub async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let command = if self.sudo {
            CommandLine::new("sudo").arg("cp")
        } else {
            CommandLine::new("cp")
        };
        self.run(command.arg(path_arg(from)).arg(path_arg(to)))
            .await
            .map(|_| ())
    }

    /// Prefix `command` with `sudo` unless it was disabled. `sudo` resets the environment, so
    /// extra variables are handed over through `env`.
    pub fn privileged(&self, command: CommandLine) -> CommandLine {
        if !self.sudo {
            return command;
        }
        let mut privileged = CommandLine::new("sudo");
        if !command.envs.is_empty() {
            privileged = privileged.arg("env").args(
                command
                    .envs
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value)),
            );
        }
        privileged.arg(command.program).args(command.args)
    }

    async fn output_of(&self, command: &CommandLine) -> Result<Output> {
        debug!("Running '{}'", command);
        let output = self.exec.exec(command).await?;
        trace!(
            "'{}' exited with {:?}\n{}",
            command.program,
            output.code,
            output.combined()
        );
        Ok(output)
    }

    fn with_kubeconfig(&self, command: CommandLine) -> CommandLine {
        match &self.kubeconfig {
            Some(path) => command.env("KUBECONFIG", path_arg(path)),
            None => command,
        }
    }
}

pub(crate) fn path_arg<P: AsRef<OsStr>>(path: P) -> String {
    path.as_ref().to_string_lossy().into_owned()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// An `Exec` that records every command line and answers from a script. A scripted reply is
    /// chosen by the first entry whose needle appears in the rendered command line; entries are
    /// reused, so a reply can be returned any number of times. Unmatched commands succeed with no
    /// output.
    #[derive(Default)]
    pub(crate) struct ScriptedExec {
        replies: Mutex<Vec<(String, Vec<Output>)>>,
        calls: Mutex<Vec<CommandLine>>,
    }

    impl ScriptedExec {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Reply to commands containing `needle` with `stdout`.
        pub(crate) fn reply(&self, needle: &str, stdout: &str) {
            self.reply_with(
                needle,
                vec![Output {
                    code: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }],
            )
        }

        /// Reply to commands containing `needle` with each output in turn, repeating the last one.
        pub(crate) fn reply_with(&self, needle: &str, outputs: Vec<Output>) {
            self.replies
                .lock()
                .unwrap()
                .push((needle.to_string(), outputs));
        }

        pub(crate) fn fail(&self, needle: &str, stderr: &str) {
            self.reply_with(
                needle,
                vec![Output {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                }],
            )
        }

        pub(crate) fn calls(&self) -> Vec<CommandLine> {
            self.calls.lock().unwrap().clone()
        }

        /// The rendered command lines, without their environment.
        pub(crate) fn lines(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|c| CommandLine { envs: vec![], ..c }.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Exec for ScriptedExec {
        async fn exec(&self, command: &CommandLine) -> Result<Output> {
            self.calls.lock().unwrap().push(command.clone());
            let line = CommandLine {
                envs: vec![],
                ..command.clone()
            }
            .to_string();
            let mut replies = self.replies.lock().unwrap();
            for (needle, outputs) in replies.iter_mut() {
                if line.contains(needle.as_str()) {
                    return Ok(if outputs.len() > 1 {
                        outputs.remove(0)
                    } else {
                        outputs[0].clone()
                    });
                }
            }
            Ok(Output {
                code: Some(0),
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::test_support::ScriptedExec;
    use super::*;

    #[tokio::test]
    async fn kubeconfig_is_exported() {
        let exec = ScriptedExec::new();
        let mut shell = Shell::new(exec.clone(), true);
        shell.run(CommandLine::new("kubectl").arg("version")).await.unwrap();
        shell.set_kubeconfig("/etc/rancher/k3s/k3s.yaml");
        shell.run(CommandLine::new("kubectl").arg("version")).await.unwrap();

        let calls = exec.calls();
        assert!(calls[0].envs.is_empty());
        assert_eq!(
            calls[1].envs,
            vec![(
                "KUBECONFIG".to_string(),
                "/etc/rancher/k3s/k3s.yaml".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let exec = ScriptedExec::new();
        exec.fail("k3s-uninstall.sh", "permission denied");
        let shell = Shell::new(exec, true);
        let err = shell
            .run(CommandLine::new("k3s-uninstall.sh"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'k3s-uninstall.sh' failed with exit status '1'"));
        assert!(message.contains("permission denied"));
    }

    #[tokio::test]
    async fn copy_uses_sudo_when_enabled() {
        let exec = ScriptedExec::new();
        Shell::new(exec.clone(), true)
            .copy(Path::new("/var/lib/backups/a.tar.gz"), Path::new("."))
            .await
            .unwrap();
        Shell::new(exec.clone(), false)
            .copy(Path::new("a.tar.gz"), Path::new("/var/lib/backups"))
            .await
            .unwrap();
        assert_eq!(
            exec.lines(),
            vec![
                "sudo cp /var/lib/backups/a.tar.gz .",
                "cp a.tar.gz /var/lib/backups"
            ]
        );
    }

    #[test]
    fn privileged_keeps_environment() {
        let shell = Shell::new(ScriptedExec::new(), true);
        let command = shell.privileged(
            CommandLine::new("sh")
                .arg("k3s-install.sh")
                .env("INSTALL_K3S_SKIP_START", "true"),
        );
        assert!(command.envs.is_empty());
        assert_eq!(
            command.to_string(),
            "sudo env INSTALL_K3S_SKIP_START=true sh k3s-install.sh"
        );

        let shell = Shell::new(ScriptedExec::new(), false);
        let command = shell.privileged(CommandLine::new("systemctl").args(["start", "k3s"]));
        assert_eq!(command.to_string(), "systemctl start k3s");
    }

    #[test]
    fn command_line_display() {
        let command = CommandLine::new("sh")
            .arg("k3s-install.sh")
            .env("INSTALL_K3S_SKIP_START", "true");
        assert_eq!(
            command.to_string(),
            "INSTALL_K3S_SKIP_START=true sh k3s-install.sh"
        );
    }
}
