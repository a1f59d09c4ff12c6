use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sink::RetryPolicy;
use crate::types::{ChunkLimits, StripMode};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// `config.toml` in the working directory, its environment overlay and `APP_*` variables.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Like [`Config::load`] but rooted at `path`; the environment overlay is
    /// looked up next to it (`config.dev.toml` for `config.toml`).
    pub fn load_from(path: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(path));
        let overlay = match env_name.as_str() {
            "dev" | "development" => Some("dev"),
            "prod" | "production" => Some("prod"),
            "test" | "testing" => Some("test"),
            _ => None,
        };
        if let Some(suffix) = overlay {
            figment = figment.merge(Toml::file(overlay_path(path, suffix)));
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self::from_figment(figment))
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed settings with defaults for every missing key, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

fn overlay_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("config");
    path.with_file_name(format!("{stem}.{suffix}.toml"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker pool size.
    pub concurrency: usize,
    /// Root of the document tree walked in directory mode.
    pub volume: PathBuf,
    /// Chunks per bulk write.
    pub batch_size: usize,
    pub chunk: ChunkLimits,
    pub filters: Filters,
    pub broken_docx_mode: bool,
    pub pdf_mode: bool,
    pub epub_mode: bool,
    pub genres_map: Option<PathBuf>,
    pub folders_map: Option<PathBuf>,
    pub index_dir: PathBuf,
    pub log_file: PathBuf,
    pub duplicates_report: PathBuf,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 12,
            volume: PathBuf::from("./volume"),
            batch_size: 3000,
            chunk: ChunkLimits::default(),
            filters: Filters::default(),
            broken_docx_mode: false,
            pdf_mode: true,
            epub_mode: true,
            genres_map: None,
            folders_map: None,
            index_dir: PathBuf::from("./index"),
            log_file: PathBuf::from("./parser_errors.log"),
            duplicates_report: PathBuf::from("./duplicates.txt"),
            storage: StorageSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub base64: StripMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub writer_heap_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { max_attempts: 1000, retry_delay_ms: 100, writer_heap_bytes: 50_000_000 }
    }
}

impl StorageSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.storage.max_attempts == 0 {
            return Err(Error::InvalidConfig("storage.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Expand `~`/`${VAR}` in every path and anchor relative ones at `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &Path| resolve_with_base(base, p.to_string_lossy());
        self.volume = resolve(&self.volume);
        self.index_dir = resolve(&self.index_dir);
        self.log_file = resolve(&self.log_file);
        self.duplicates_report = resolve(&self.duplicates_report);
        self.genres_map = self.genres_map.as_deref().map(resolve);
        self.folders_map = self.folders_map.as_deref().map(resolve);
        self
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against `base` after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> Config {
        Config::from_figment(Figment::from(Toml::string(text)))
    }

    #[test]
    fn empty_config_yields_defaults() {
        let settings = from_toml("").settings().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunk, ChunkLimits { min: 300, optimal: 1800, max: 3500 });
        assert_eq!(settings.concurrency, 12);
        assert_eq!(settings.batch_size, 3000);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let settings = from_toml(
            r#"
            concurrency = 4
            [chunk]
            max = 4000
            [filters]
            base64 = "recursive"
            "#,
        )
        .settings()
        .unwrap();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.chunk, ChunkLimits { min: 300, optimal: 1800, max: 4000 });
        assert_eq!(settings.filters.base64, StripMode::Recursive);
        assert!(settings.pdf_mode);
    }

    #[test]
    fn inconsistent_limits_are_rejected() {
        let err = from_toml("[chunk]\nmin = 2000").settings().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(from_toml("concurrency = 0").settings().is_err());
        assert!(from_toml("batch_size = 0").settings().is_err());
        assert!(from_toml("[storage]\nmax_attempts = 0").settings().is_err());
    }

    #[test]
    fn get_reads_nested_keys() {
        let config = from_toml("[storage]\nretry_delay_ms = 5");
        let delay: u64 = config.get("storage.retry_delay_ms").unwrap();
        assert_eq!(delay, 5);
        assert!(config.get::<u64>("storage.missing").is_err());
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/folio");
        let settings = Settings {
            genres_map: Some(PathBuf::from("maps/genres.csv")),
            log_file: PathBuf::from("/var/log/folio.log"),
            ..Settings::default()
        }
        .resolve_paths(base);
        assert_eq!(settings.index_dir, base.join("./index"));
        assert_eq!(settings.genres_map, Some(base.join("maps/genres.csv")));
        assert_eq!(settings.log_file, PathBuf::from("/var/log/folio.log"));
    }

    #[test]
    fn overlay_sits_next_to_base_file() {
        assert_eq!(
            overlay_path(Path::new("/etc/folio/config.toml"), "prod"),
            PathBuf::from("/etc/folio/config.prod.toml")
        );
    }
}
