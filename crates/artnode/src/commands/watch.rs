//! `artnode watch` command implementation.

use std::sync::Arc;

use artnode_storage::Storage;
use artnode_storage_fs::FsStorage;
use clap::Args;

use super::{CommonArgs, open_site, print_paths, print_report};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the watch command.
#[derive(Args)]
pub(crate) struct WatchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Settle window for file events in milliseconds (overrides config).
    #[arg(long)]
    debounce_ms: Option<u64>,
}

impl WatchArgs {
    /// Execute the watch command.
    ///
    /// Runs until the watcher shuts down. Failed rebuilds are reported and
    /// the previous graph stays published.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the initial build is
    /// rejected, or the watcher can't be started.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.common.load_config(self.debounce_ms)?;
        print_paths(&output, &config);

        let fs = FsStorage::with_patterns(config.content_resolved.root.clone(), &config.watch.patterns)?
            .with_debounce(config.watch.debounce());
        let storage: Arc<dyn Storage> = Arc::new(fs);
        let site = open_site(Arc::clone(&storage), &config)?;

        let report = site.rebuild()?;
        print_report(&output, &site, &report);

        let (events, _handle) = storage.watch()?;
        output.separator();
        output.highlight("Watching for changes (Ctrl+C to stop)");

        while let Some(first) = events.recv() {
            let mut paths = vec![first.path];
            while let Some(event) = events.try_recv() {
                paths.push(event.path);
            }
            tracing::debug!(count = paths.len(), "Change batch received");

            match site.on_change(paths) {
                Ok(Some(report)) => print_report(&output, &site, &report),
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    output.warning(&format!("Rebuild deferred: {e}"));
                }
                Err(e) => output.error(&format!("Rebuild failed, keeping previous graph: {e}")),
            }
        }

        tracing::info!("Watcher stopped");
        Ok(())
    }
}
