use anyhow::Result;
use clap::Parser;
use e2e_harness::Label;

/// List the scenario labels.
#[derive(Debug, Parser)]
pub(crate) struct List {}

impl List {
    pub(crate) fn run(self) -> Result<()> {
        for label in Label::ALL {
            println!("{}", label);
        }
        Ok(())
    }
}
