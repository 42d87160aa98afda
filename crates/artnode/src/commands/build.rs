//! `artnode build` command implementation.

use std::sync::Arc;

use artnode_storage::Storage;
use artnode_storage_fs::FsStorage;
use clap::Args;

use super::{CommonArgs, open_site, print_paths, print_report};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Fail when the build reports any diagnostic.
    #[arg(long)]
    strict: bool,
}

impl BuildArgs {
    /// Execute the build command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the build is rejected, or
    /// `--strict` is set and diagnostics were reported.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.common.load_config(None)?;
        print_paths(&output, &config);

        let storage: Arc<dyn Storage> =
            Arc::new(FsStorage::new(config.content_resolved.root.clone()));
        let site = open_site(storage, &config)?;

        let report = site.rebuild()?;
        print_report(&output, &site, &report);

        if self.strict && report.diagnostics > 0 {
            return Err(CliError::Validation(format!(
                "{} diagnostics reported in strict mode",
                report.diagnostics
            )));
        }
        Ok(())
    }
}
