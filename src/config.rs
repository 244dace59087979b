// Configuration management for Prism

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PrismError, Result};

/// Name of the per-project configuration file
pub const CONFIG_FILENAME: &str = ".prism.toml";

/// Environment variable that relocates the workspace directory
pub const ENV_OUTPUT_DIR: &str = "PRISM_OUTPUT_DIR";

/// Hard ceiling for any row limit accepted from a caller
pub const MAX_LIMIT: usize = 500;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub workspace: WorkspaceConfig,
    pub namespaces: NamespacesConfig,
    pub indexing: IndexingConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace directory, relative to the project root unless absolute
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespacesConfig {
    pub default: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
    /// Files processed per committed transaction
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Over-fetch multiplier used when search results are collapsed per type
    pub dedupe_overfetch: usize,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub transport: String,
    pub port: u16,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { dir: "workspace".to_string() }
    }
}

impl Default for NamespacesConfig {
    fn default() -> Self {
        Self { default: "release".to_string() }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["java".to_string()],
            exclude: vec!["META-INF/".to_string(), "package-info.java".to_string()],
            batch_size: 1000,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 30,
            max_limit: MAX_LIMIT,
            dedupe_overfetch: 20,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            port: 8000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            workspace: WorkspaceConfig::default(),
            namespaces: NamespacesConfig::default(),
            indexing: IndexingConfig::default(),
            query: QueryConfig::default(),
            logging: LoggingConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .prism.toml in the project root; the project root is always
    /// the directory passed in, whatever the file says.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let project_dir = project_dir.as_ref();
        let config_path = project_dir.join(CONFIG_FILENAME);

        let mut config = match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::debug!("Using default configuration");
                Self::default()
            }
        };
        config.project.root = project_dir.to_string_lossy().to_string();
        config.apply_output_dir(std::env::var(ENV_OUTPUT_DIR).ok());
        config
    }

    /// Point the workspace at `dir` when it names an existing directory
    pub fn apply_output_dir(&mut self, dir: Option<String>) {
        let Some(dir) = dir.and_then(|d| std::fs::canonicalize(d).ok()).filter(|d| d.is_dir()) else {
            return;
        };
        tracing::debug!("Workspace overridden by {}: {}", ENV_OUTPUT_DIR, dir.display());
        self.workspace.dir = dir.to_string_lossy().to_string();
    }

    /// `workspace.dir` resolved against the project root
    pub fn workspace_dir(&self) -> PathBuf {
        let dir = Path::new(&self.workspace.dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            Path::new(&self.project.root).join(dir)
        }
    }

    /// Root of the source tree for a namespace
    pub fn source_dir(&self, namespace: &str) -> PathBuf {
        self.workspace_dir().join("decompiled").join(namespace)
    }

    pub fn db_dir(&self) -> PathBuf {
        self.workspace_dir().join("db")
    }

    /// Store file for a namespace
    pub fn db_path(&self, namespace: &str) -> PathBuf {
        self.db_dir().join(format!("prism_api_{}.db", namespace))
    }

    /// Resolve an optional namespace from a request to a validated name
    pub fn resolve_namespace(&self, namespace: Option<&str>) -> Result<String> {
        let namespace = match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => ns,
            _ => self.namespaces.default.as_str(),
        };
        validate_namespace(namespace)?;
        Ok(namespace.to_string())
    }

    /// Clamp a caller-supplied limit into [1, max_limit]
    pub fn clamp_limit(&self, limit: Option<i64>) -> usize {
        let max = self.query.max_limit.min(MAX_LIMIT);
        match limit {
            Some(limit) => limit.clamp(1, max as i64) as usize,
            None => self.query.default_limit.clamp(1, max),
        }
    }

    /// Check if a relative source path should be indexed
    pub fn should_index_file(&self, relative_path: &str) -> bool {
        let has_extension = self.indexing.extensions.iter().any(|ext| {
            Path::new(relative_path)
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(ext.as_str()))
        });
        if !has_extension {
            return false;
        }

        !self
            .indexing
            .exclude
            .iter()
            .any(|pattern| self.matches_pattern(relative_path, pattern))
    }

    /// Simple pattern matching: `dir/` matches a directory anywhere in the
    /// path, `*.suffix` matches a suffix, anything else matches a file name.
    fn matches_pattern(&self, file_path: &str, pattern: &str) -> bool {
        if pattern.ends_with('/') {
            let dir = pattern.trim_end_matches('/');
            file_path.starts_with(pattern) || file_path.contains(&format!("/{}/", dir))
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            file_path.ends_with(suffix)
        } else {
            file_path == pattern || file_path.ends_with(&format!("/{}", pattern))
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            return Err(anyhow::anyhow!("Project name cannot be empty"));
        }

        validate_namespace(&self.namespaces.default)
            .map_err(|e| anyhow::anyhow!("Invalid default namespace: {}", e))?;

        if self.indexing.extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one source extension is required"));
        }
        if self.indexing.batch_size == 0 {
            return Err(anyhow::anyhow!("Batch size must be greater than 0"));
        }

        if self.query.max_limit == 0 || self.query.max_limit > MAX_LIMIT {
            return Err(anyhow::anyhow!("Query max_limit must be between 1 and {}", MAX_LIMIT));
        }
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err(anyhow::anyhow!("Query default_limit must be between 1 and max_limit"));
        }
        if self.query.dedupe_overfetch == 0 {
            return Err(anyhow::anyhow!("Query dedupe_overfetch must be greater than 0"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        let valid_transports = ["stdio"];
        if !valid_transports.contains(&self.mcp.transport.as_str()) {
            return Err(anyhow::anyhow!("Invalid MCP transport: {}", self.mcp.transport));
        }
        if self.mcp.port == 0 {
            return Err(anyhow::anyhow!("MCP port must be greater than 0"));
        }

        Ok(())
    }
}

/// Namespaces become file-name fragments, so only a conservative alphabet is accepted
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace.len() <= 64
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PrismError::InvalidRequest(format!("invalid namespace '{}'", namespace)))
    }
}
