//! Configuration management for artnode.
//!
//! Parses `artnode.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `content.root`
//! - `content.schema_file`
//! - `build.output_dir`
//! - `media.public_base`
//! - `media.signed_base`
//! - `media.signing_secret`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override content root directory.
    pub content_root: Option<PathBuf>,
    /// Override artifact output directory.
    pub output_dir: Option<PathBuf>,
    /// Override worker pool size.
    pub workers: Option<usize>,
    /// Override watcher debounce window.
    pub debounce_ms: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "artnode.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content tree configuration (paths are relative strings from TOML).
    content: ContentConfigRaw,
    /// Build configuration (paths are relative strings from TOML).
    build: BuildConfigRaw,
    /// Media access configuration.
    pub media: MediaConfig,
    /// File watching configuration.
    pub watch: WatchConfig,
    /// Global presentation defaults.
    pub defaults: DefaultsConfig,

    /// Resolved content configuration (set after loading).
    #[serde(skip)]
    pub content_resolved: ContentConfig,
    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: BuildConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentConfigRaw {
    root: Option<String>,
    index_name: Option<String>,
    meta_name: Option<String>,
    schema_file: Option<String>,
}

/// Resolved content tree configuration with absolute paths.
#[derive(Debug, Default)]
pub struct ContentConfig {
    /// Content root directory.
    pub root: PathBuf,
    /// Filename of a node's index document.
    pub index_name: String,
    /// Filename of a directory's collection meta document.
    pub meta_name: String,
    /// Optional YAML schema overlay.
    pub schema_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    output_dir: Option<String>,
    workers: Option<usize>,
    read_timeout_ms: Option<u64>,
}

/// Resolved build configuration.
#[derive(Debug, Default)]
pub struct BuildConfig {
    /// Directory the artifact set is written to.
    pub output_dir: PathBuf,
    /// Worker pool size. `0` means one worker per available CPU.
    pub workers: usize,
    /// Per-document read timeout in milliseconds.
    pub read_timeout_ms: u64,
}

impl BuildConfig {
    /// Per-document read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Effective worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

/// Media access configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Prefix for public asset paths.
    pub public_base: String,
    /// Prefix for signed asset URLs.
    pub signed_base: String,
    /// Secret for the built-in signer. Signed assets degrade without it.
    pub signing_secret: Option<String>,
    /// Lifetime of issued tokens in seconds.
    pub ttl_secs: u64,
    /// Upper bound for a single signing call in milliseconds.
    pub sign_timeout_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            public_base: "/media".to_owned(),
            signed_base: "/media/signed".to_owned(),
            signing_secret: None,
            ttl_secs: 3600,
            sign_timeout_ms: 2000,
        }
    }
}

impl MediaConfig {
    /// Token lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Signing timeout.
    #[must_use]
    pub fn sign_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_timeout_ms)
    }
}

/// File watching configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet window that folds bursts of file events into one re-index.
    pub debounce_ms: u64,
    /// Glob patterns of files to watch. Empty watches everything.
    pub patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            patterns: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Global presentation defaults, used when nothing in the tree declares one.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Fallback layout.
    pub layout: String,
    /// Fallback theme when the content-root meta has none.
    pub theme: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            layout: "default".to_owned(),
            theme: "default".to_owned(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`media.signing_secret`").
        field: String,
        /// Error message (e.g., "${`ARTNODE_SECRET`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a numeric field to be positive.
fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

/// Require a document filename to be a bare name.
fn require_file_name(value: &str, field: &str) -> Result<(), ConfigError> {
    require_non_empty(value, field)?;
    if value.contains('/') || value.contains('\\') || value.starts_with('.') {
        return Err(ConfigError::Validation(format!(
            "{field} must be a plain file name"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `artnode.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the result does not validate.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(root) = &settings.content_root {
            self.content_resolved.root.clone_from(root);
        }
        if let Some(output_dir) = &settings.output_dir {
            self.build_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(workers) = settings.workers {
            self.build_resolved.workers = workers;
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.watch.debounce_ms = debounce_ms;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            content: ContentConfigRaw::default(),
            build: BuildConfigRaw::default(),
            media: MediaConfig::default(),
            watch: WatchConfig::default(),
            defaults: DefaultsConfig::default(),
            content_resolved: ContentConfig::default(),
            build_resolved: BuildConfig::default(),
            config_path: None,
        };
        config.resolve_paths(base);
        config
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_content()?;
        self.validate_build()?;
        self.validate_media()?;
        require_non_empty(&self.defaults.layout, "defaults.layout")?;
        require_non_empty(&self.defaults.theme, "defaults.theme")?;
        Ok(())
    }

    fn validate_content(&self) -> Result<(), ConfigError> {
        let content = &self.content_resolved;
        require_file_name(&content.index_name, "content.index_name")?;
        require_file_name(&content.meta_name, "content.meta_name")?;
        if content.index_name == content.meta_name {
            return Err(ConfigError::Validation(
                "content.index_name and content.meta_name must differ".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_build(&self) -> Result<(), ConfigError> {
        const MAX_WORKERS: usize = 512;

        require_positive(self.build_resolved.read_timeout_ms, "build.read_timeout_ms")?;
        if self.build_resolved.workers > MAX_WORKERS {
            return Err(ConfigError::Validation(format!(
                "build.workers cannot exceed {MAX_WORKERS}"
            )));
        }
        if self.build_resolved.output_dir == self.content_resolved.root {
            return Err(ConfigError::Validation(
                "build.output_dir cannot be the content root".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_media(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.media.public_base, "media.public_base")?;
        require_non_empty(&self.media.signed_base, "media.signed_base")?;
        require_positive(self.media.ttl_secs, "media.ttl_secs")?;
        require_positive(self.media.sign_timeout_ms, "media.sign_timeout_ms")?;
        if let Some(secret) = &self.media.signing_secret {
            require_non_empty(secret, "media.signing_secret")?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.content.root, "content.root")?;
        expand::expand_opt(&mut self.content.schema_file, "content.schema_file")?;
        expand::expand_opt(&mut self.build.output_dir, "build.output_dir")?;

        self.media.public_base = expand::expand_env(&self.media.public_base, "media.public_base")?;
        self.media.signed_base = expand::expand_env(&self.media.signed_base, "media.signed_base")?;
        expand::expand_opt(&mut self.media.signing_secret, "media.signing_secret")?;

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.content_resolved = ContentConfig {
            root: resolve(self.content.root.as_deref(), "content"),
            index_name: self
                .content
                .index_name
                .clone()
                .unwrap_or_else(|| "index.yaml".to_owned()),
            meta_name: self
                .content
                .meta_name
                .clone()
                .unwrap_or_else(|| "_meta.yaml".to_owned()),
            schema_file: self.content.schema_file.as_deref().map(|p| config_dir.join(p)),
        };

        self.build_resolved = BuildConfig {
            output_dir: resolve(self.build.output_dir.as_deref(), "dist"),
            workers: self.build.workers.unwrap_or(0),
            read_timeout_ms: self.build.read_timeout_ms.unwrap_or(5000),
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(toml: &str, base: &str) -> Config {
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new(base));
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/site"));
        assert_eq!(config.content_resolved.root, PathBuf::from("/site/content"));
        assert_eq!(config.content_resolved.index_name, "index.yaml");
        assert_eq!(config.content_resolved.meta_name, "_meta.yaml");
        assert!(config.content_resolved.schema_file.is_none());
        assert_eq!(config.build_resolved.output_dir, PathBuf::from("/site/dist"));
        assert_eq!(config.build_resolved.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.media.public_base, "/media");
        assert_eq!(config.media.ttl(), Duration::from_secs(3600));
        assert_eq!(config.watch.debounce(), Duration::from_millis(100));
        assert_eq!(config.defaults.layout, "default");
        assert_eq!(config.defaults.theme, "default");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
[content]
root = "site"
index_name = "node.yaml"
meta_name = "_collection.yaml"
schema_file = "schema.yaml"

[build]
output_dir = "public"
workers = 4
read_timeout_ms = 250

[media]
public_base = "https://cdn.example.com"
signed_base = "https://vault.example.com"
signing_secret = "s3cret"
ttl_secs = 600
sign_timeout_ms = 100

[watch]
debounce_ms = 300
patterns = ["**/*.yaml", "**/*.md"]

[defaults]
layout = "grid"
theme = "noir"
"#,
            "/project",
        );

        assert_eq!(config.content_resolved.root, PathBuf::from("/project/site"));
        assert_eq!(config.content_resolved.index_name, "node.yaml");
        assert_eq!(
            config.content_resolved.schema_file,
            Some(PathBuf::from("/project/schema.yaml"))
        );
        assert_eq!(
            config.build_resolved.output_dir,
            PathBuf::from("/project/public")
        );
        assert_eq!(config.build_resolved.worker_count(), 4);
        assert_eq!(config.media.signing_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.media.sign_timeout(), Duration::from_millis(100));
        assert_eq!(config.watch.patterns, vec!["**/*.yaml", "**/*.md"]);
        assert_eq!(config.defaults.theme, "noir");
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_workers_uses_available_parallelism() {
        let config = Config::default_with_base(Path::new("/site"));
        assert_eq!(config.build_resolved.workers, 0);
        assert!(config.build_resolved.worker_count() >= 1);
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.apply_cli_settings(&CliSettings {
            content_root: Some(PathBuf::from("/elsewhere/content")),
            workers: Some(2),
            ..Default::default()
        });

        assert_eq!(
            config.content_resolved.root,
            PathBuf::from("/elsewhere/content")
        );
        assert_eq!(config.build_resolved.workers, 2);
        // Unchanged
        assert_eq!(config.build_resolved.output_dir, PathBuf::from("/site/dist"));
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.apply_cli_settings(&CliSettings::default());
        assert_eq!(config.content_resolved.root, PathBuf::from("/site/content"));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("ARTNODE_TEST_SECRET", "from-env");
            std::env::remove_var("ARTNODE_TEST_CDN");
        }

        let mut config: Config = toml::from_str(
            r#"
[media]
public_base = "${ARTNODE_TEST_CDN:-https://cdn.example.com}"
signing_secret = "${ARTNODE_TEST_SECRET}"
"#,
        )
        .unwrap();
        config.expand_env_vars().unwrap();

        assert_eq!(config.media.public_base, "https://cdn.example.com");
        assert_eq!(config.media.signing_secret.as_deref(), Some("from-env"));

        unsafe {
            std::env::remove_var("ARTNODE_TEST_SECRET");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("ARTNODE_MISSING_OUTPUT");
        }

        let mut config: Config = toml::from_str(
            r#"
[build]
output_dir = "${ARTNODE_MISSING_OUTPUT}"
"#,
        )
        .unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("build.output_dir"));
    }

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(
                msg.contains(s),
                "Expected error to contain '{s}', got: {msg}"
            );
        }
    }

    #[test]
    fn test_validate_same_document_names() {
        let config = parse(
            r#"
[content]
index_name = "node.yaml"
meta_name = "node.yaml"
"#,
            "/p",
        );
        assert_validation_error(&config, &["must differ"]);
    }

    #[test]
    fn test_validate_document_name_with_separator() {
        let config = parse("[content]\nindex_name = \"a/index.yaml\"\n", "/p");
        assert_validation_error(&config, &["content.index_name", "plain file name"]);
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let config = parse("[build]\nread_timeout_ms = 0\n", "/p");
        assert_validation_error(&config, &["build.read_timeout_ms"]);

        let config = parse("[media]\nttl_secs = 0\n", "/p");
        assert_validation_error(&config, &["media.ttl_secs"]);
    }

    #[test]
    fn test_validate_output_dir_cannot_be_content_root() {
        let config = parse(
            "[content]\nroot = \"site\"\n[build]\noutput_dir = \"site\"\n",
            "/p",
        );
        assert_validation_error(&config, &["content root"]);
    }

    #[test]
    fn test_validate_empty_defaults() {
        let config = parse("[defaults]\ntheme = \"  \"\n", "/p");
        assert_validation_error(&config, &["defaults.theme"]);
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/artnode.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[content]\nroot = \"tree\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.content_resolved.root, dir.path().join("tree"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[content\n").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
