use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Trait implemented by top-level configuration structures.
pub trait Config {
    /// Keys whose values should be parsed as comma-separated lists when read from env vars.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),
}

/// Loads configuration from `./configuration` for the environment named by `APP_ENVIRONMENT`.
///
/// Nested keys can be overridden with double underscores, e.g.
/// `APP_PIPELINE__BATCH__PAGE_SIZE=500`.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads configuration from an explicit directory and environment.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(configuration_directory, ConfigFileKind::Base)?;
    let environment_file = find_configuration_file(
        configuration_directory,
        ConfigFileKind::Environment(environment),
    )?;

    let mut environment_source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source.list_separator(LIST_SEPARATOR);
        for key in T::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let builder = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::from(base_file.clone()));
    validate_configuration_source(&builder, ConfigFileKind::Base, &base_file)?;

    let builder = builder.add_source(rust_cli_config::File::from(environment_file.clone()));
    validate_configuration_source(
        &builder,
        ConfigFileKind::Environment(environment),
        &environment_file,
    )?;

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<PathBuf, LoadConfigError> {
    let stem = kind.stem();
    let mut attempted_paths = Vec::with_capacity(CONFIG_FILE_EXTENSIONS.len());

    for extension in CONFIG_FILE_EXTENSIONS {
        let path = directory.join(format!("{stem}.{extension}"));
        if path.is_file() {
            return Ok(path);
        }
        attempted_paths.push(path);
    }

    let attempted = attempted_paths
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

/// Builds the configuration accumulated so far to surface parse errors per file.
fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Deserialize)]
    struct SampleConfig {
        name: String,
        size: usize,
    }

    impl Config for SampleConfig {
        const LIST_PARSE_KEYS: &'static [&'static str] = &[];
    }

    fn scratch_dir() -> PathBuf {
        let n = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "indexer-config-test-{}-{n}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let dir = scratch_dir();
        fs::write(dir.join("base.yaml"), "name: base\nsize: 1\n").unwrap();
        fs::write(dir.join("prod.yaml"), "size: 42\n").unwrap();

        let config: SampleConfig = load_config_from(&dir, Environment::Prod).unwrap();
        assert_eq!(config.name, "base");
        assert_eq!(config.size, 42);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_environment_file_is_reported() {
        let dir = scratch_dir();
        fs::write(dir.join("base.yaml"), "name: base\nsize: 1\n").unwrap();

        let err = load_config_from::<SampleConfig>(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(
            err,
            LoadConfigError::ConfigurationFileMissing { .. }
        ));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = std::env::temp_dir().join("indexer-config-test-does-not-exist");
        let err = load_config_from::<SampleConfig>(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::MissingConfigurationDirectory(_)));
    }
}
