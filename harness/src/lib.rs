/*!

This library drives the backup/restore end-to-end tests: it installs K3s, the Kubewarden stack and
the rancher-backup operator, submits Backup and Restore objects and polls the cluster until the
operator reports that they are done.

Every interaction with the host goes through the [`Exec`] trait, normally [`HostExec`], which runs
`kubectl`, `helm` and the K3s scripts as child processes. Scenarios are selected by [`Label`] and
run in order against a single [`Scenario`] context.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]
#![cfg_attr(
    test,
    allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)
)]

pub use error::{Error, Result};
pub use exec::{CommandLine, Exec, HostExec, Output, Shell};
pub use poll::Poll;
pub use scenario::{Label, Scenario};
pub use settings::Settings;

pub mod backup;
pub mod cluster;
mod error;
mod exec;
pub mod helm;
pub mod k3s;
pub mod kubectl;
pub mod manifest;
mod poll;
mod scenario;
mod settings;
pub mod stack;
