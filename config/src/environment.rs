use std::fmt;
use std::io;
use std::str::FromStr;

/// Name of the environment variable selecting the environment configuration file.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const DEV_ENV_NAME: &str = "dev";

const PROD_ENV_NAME: &str = "prod";

/// Runtime environment of the indexer.
///
/// Selects which `configuration/{environment}.yaml` file is layered on top of the base file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`, falling back to [`Environment::Dev`].
    pub fn load() -> Result<Environment, io::Error> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Dev),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = io::Error;

    /// Parses an environment name case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Environment::Dev),
            PROD_ENV_NAME => Ok(Environment::Prod),
            other => Err(io::Error::other(format!(
                "{other} is not a supported environment. Use either `{DEV_ENV_NAME}` or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}
