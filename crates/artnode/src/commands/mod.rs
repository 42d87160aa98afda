//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use artnode_config::{CliSettings, Config};
use artnode_graph::{
    BuildReport, Defaults, DocumentNames, MediaSettings, Sha256Signer, Site, SiteConfig,
};
use artnode_schema::SchemaRegistry;
use artnode_storage::Storage;
use clap::Args;

pub(crate) use build::BuildArgs;
pub(crate) use watch::WatchArgs;

use crate::error::CliError;
use crate::output::Output;

/// Arguments shared by every command.
#[derive(Args)]
pub(crate) struct CommonArgs {
    /// Path to configuration file (default: auto-discover artnode.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Content tree root (overrides config).
    #[arg(short = 'r', long)]
    content_root: Option<PathBuf>,

    /// Artifact output directory (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Build worker threads, 0 for one per CPU (overrides config).
    #[arg(short, long, env = "ARTNODE_WORKERS")]
    workers: Option<usize>,

    /// Enable verbose output (build timings and per-build logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Load configuration with command-line overrides applied.
    fn load_config(&self, debounce_ms: Option<u64>) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            content_root: self.content_root.clone(),
            output_dir: self.output_dir.clone(),
            workers: self.workers,
            debounce_ms,
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }
}

/// Map loaded configuration onto the compiler's settings.
pub(crate) fn site_config(config: &Config) -> Result<SiteConfig, CliError> {
    let content = &config.content_resolved;
    let registry = SchemaRegistry::load(content.schema_file.as_deref())?;

    Ok(SiteConfig {
        names: DocumentNames {
            index: content.index_name.clone(),
            meta: content.meta_name.clone(),
        },
        defaults: Defaults {
            layout: config.defaults.layout.clone(),
            theme: config.defaults.theme.clone(),
        },
        media: MediaSettings {
            public_base: config.media.public_base.clone(),
            signed_base: config.media.signed_base.clone(),
            ttl: config.media.ttl(),
            sign_timeout: config.media.sign_timeout(),
        },
        read_timeout: config.build_resolved.read_timeout(),
        workers: config.build_resolved.workers,
        output_dir: Some(config.build_resolved.output_dir.clone()),
        registry,
    })
}

/// Create a site over `storage`, with a signer when a secret is configured.
pub(crate) fn open_site(storage: Arc<dyn Storage>, config: &Config) -> Result<Site, CliError> {
    let site = Site::new(storage, site_config(config)?)?;
    Ok(match &config.media.signing_secret {
        Some(secret) => site.with_signer(Arc::new(Sha256Signer::new(secret.clone()))),
        None => site,
    })
}

/// Print where a build reads from and writes to.
fn print_paths(output: &Output, config: &Config) {
    output.info(&format!(
        "Content: {}",
        config.content_resolved.root.display()
    ));
    output.info(&format!(
        "Output: {}",
        config.build_resolved.output_dir.display()
    ));
    if config.media.signing_secret.is_none() {
        output.warning("No media.signing_secret configured: signed media will be omitted");
    }
}

/// Print a build summary and the current diagnostics.
fn print_report(output: &Output, site: &Site, report: &BuildReport) {
    let scope = report
        .closure
        .map_or_else(|| "full".to_owned(), |n| format!("{n} affected"));
    output.success(&format!(
        "Generation {}: {} nodes ({} valid, {scope}) in {:.2?}",
        report.generation, report.nodes, report.valid, report.elapsed
    ));
    output.info(&format!(
        "Artifacts: {} written, {} unchanged, {} removed",
        report.written, report.unchanged, report.removed
    ));

    let diagnostics = site.diagnostics();
    if !diagnostics.is_empty() {
        output.warning(&format!("{} diagnostics:", diagnostics.len()));
        for diagnostic in &diagnostics {
            output.detail(&diagnostic.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_site_config_from_defaults() {
        let config = Config::default();

        let site = site_config(&config).unwrap();

        assert_eq!(site.names.index, "index.yaml");
        assert_eq!(site.names.meta, "_meta.yaml");
        assert_eq!(site.defaults.layout, "default");
        assert_eq!(site.media.public_base, "/media");
        assert_eq!(site.media.ttl.as_secs(), 3600);
        assert_eq!(site.read_timeout.as_millis(), 5000);
        assert_eq!(site.output_dir, Some(config.build_resolved.output_dir.clone()));
    }

    #[test]
    fn test_missing_schema_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.content_resolved.schema_file = Some(temp.path().join("missing.yaml"));

        assert!(matches!(site_config(&config), Err(CliError::Schema(_))));
    }
}
