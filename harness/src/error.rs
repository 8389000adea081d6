use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to create kubernetes client: {}", source))]
    ClientCreate {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display(
        "'{}' failed with exit status '{}'\n\n{}\n\n{}",
        command,
        code,
        stdout,
        stderr
    ))]
    CommandFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[snafu(display("Unable to read kubeconfig '{}': {}", path.display(), source))]
    ConfigRead {
        path: PathBuf,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Expected a value for {} but got nothing", what))]
    Empty { what: String },

    #[snafu(display("Unable to {} '{}': {}", action, path.display(), source))]
    File {
        action: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    Kube { action: String, source: kube::Error },

    #[snafu(display("The HOME environment variable is not set"))]
    MissingHome,

    #[snafu(display("File '{}' does not exist", path.display()))]
    MissingFile { path: PathBuf },

    #[snafu(display("Unable to read settings from the environment: {}", source))]
    Settings { source: envy::Error },

    #[snafu(display("Unable to run '{}': {}", command, source))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "Timed out after {:?} waiting for {}{}",
        timeout,
        what,
        last_error
            .as_ref()
            .map(|e| format!(" (last error: {})", e))
            .unwrap_or_default()
    ))]
    Timeout {
        what: String,
        timeout: Duration,
        last_error: Option<String>,
    },
}
