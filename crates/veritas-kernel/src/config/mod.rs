//! Configuration loading
//!
//! Format-agnostic loading for the typed configuration structs defined in
//! `veritas-foundation`. Supports YAML, TOML, JSON, INI, RON and JSON5.
//!
//! - Format is detected from the file extension
//! - `${VAR}` and `$VAR` references are substituted from the environment
//!   before parsing (unset variables are left untouched)
//! - Several sources can be layered, later ones overriding earlier ones
//! - `PREFIX__SECTION__KEY` environment variables can override file values

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;

pub use config::FileFormat as Format;

/// Configuration loading / validation error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The file parsed but its values are inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

const ENV_REFERENCE: &str = r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)\b)";

/// Detect configuration format from file extension
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
/// - INI: `.ini`
/// - RON: `.ron`
/// - JSON5: `.json5`
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// Both `${VAR_NAME}` and `$VAR_NAME` are recognised. References to unset
/// variables are kept verbatim so a missing key surfaces at validation time
/// rather than as an empty string.
///
/// ```rust,ignore
/// use veritas_kernel::config::substitute_env_vars;
///
/// std::env::set_var("WATSONX_KEY", "secret");
/// let result = substitute_env_vars("api_key: ${WATSONX_KEY}")?;
/// assert_eq!(result, "api_key: secret");
/// ```
pub fn substitute_env_vars(content: &str) -> ConfigResult<String> {
    let re = Regex::new(ENV_REFERENCE).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let result = re.replace_all(content, |caps: &regex::Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(result.into_owned())
}

fn build<T>(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file
///
/// ```rust,ignore
/// use veritas_kernel::config::load_config;
///
/// let config: VeritasConfig = load_config("veritas.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content)?;
    build(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Merge multiple configuration sources
///
/// Later sources override earlier ones (defaults -> site file -> local file).
pub fn merge_configs<T>(sources: &[(&str, FileFormat)]) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    for (content, format) in sources {
        let substituted = substitute_env_vars(content)?;
        builder = builder.add_source(File::from_str(&substituted, *format));
    }

    build(builder)
}

/// Load configuration from multiple files with later files overriding earlier ones
pub fn load_merged<T>(paths: &[&str]) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    for path in paths {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content)?;
        builder = builder.add_source(File::from_str(&substituted, format));
    }

    build(builder)
}

/// Load configuration with environment variable overrides
///
/// Environment variables use the given prefix and `__` for nesting, so
/// `VERITAS_SCORER__THRESHOLD=0.8` overrides `scorer.threshold`.
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content)?;

    build(
        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            ),
    )
}


// File-based loader tests
#[cfg(test)]
mod tests;
