use anyhow::{Context, Result};
use clap::Parser;
use e2e_harness::{HostExec, Label, Scenario, Settings};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Run scenarios in the order given. The first failing scenario stops the run.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// The scenarios to run. Every scenario runs, in `list` order, when none are given.
    #[clap(value_name = "LABEL")]
    labels: Vec<Label>,
}

impl Run {
    pub(crate) async fn run(self, kubeconfig: Option<PathBuf>) -> Result<()> {
        let settings =
            Settings::from_env().context("Unable to read settings from E2E_* variables")?;
        let labels = if self.labels.is_empty() {
            Label::ALL.to_vec()
        } else {
            self.labels
        };
        let mut scenario = Scenario::new(settings, Arc::new(HostExec), kubeconfig)
            .context("Unable to prepare the scenario context")?;
        for label in &labels {
            scenario
                .run(*label)
                .await
                .with_context(|| format!("Scenario '{}' failed", label))?;
        }
        info!("{} scenario(s) passed", labels.len());
        Ok(())
    }
}
