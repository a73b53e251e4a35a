use super::Config;
use crate::error::SchedulerError;
use figment::providers::{Env, Format, Json, Serialized};
use figment::value::Value;
use figment::{Figment, Provider};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use validator::Validate;

/// Layers a JSON config file, an optional dotenv file and the process
/// environment into a validated [`Config`].
///
/// Precedence, lowest to highest:
/// 1. JSON config file
/// 2. dotenv file (if any)
/// 3. Process environment
///
/// Variable names map onto config paths by lower-casing and turning `_`
/// into nesting, so `REDIS_URL` overrides `redis.url`.
///
/// The dotenv file is read into its own layer; the process environment
/// is never modified.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_file: PathBuf,
    env_file: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            env_file: None,
            env_prefix: None,
        }
    }

    /// Load `env_file` (skipped when empty) and `config_file` in one call.
    pub fn load(
        env_file: impl AsRef<Path>,
        config_file: impl AsRef<Path>,
    ) -> Result<Config, SchedulerError> {
        Self::new(config_file.as_ref())
            .env_file(env_file)
            .extract()
    }

    /// Optional dotenv file. An empty path disables it.
    pub fn env_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        self.env_file = (!path.as_os_str().is_empty()).then(|| path.to_path_buf());
        self
    }

    /// Only consider variables starting with `prefix`; the prefix is
    /// stripped before mapping the rest onto a config path.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.env_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn extract(&self) -> Result<Config, SchedulerError> {
        let dotenv = match self.env_file.as_deref() {
            Some(path) => self.dotenv_layer(path),
            None => Figment::new(),
        };

        if !self.config_file.exists() {
            error!(path = %self.config_file.display(), "config file not found");
            return Err(SchedulerError::InvalidConfigFilePath(
                self.config_file.clone(),
            ));
        }

        // Parse eagerly so a broken file is reported apart from a bad shape.
        let file = Json::file(&self.config_file);
        file.data().map_err(|e| {
            error!(path = %self.config_file.display(), error = %e, "error loading config");
            SchedulerError::FileLoad(e.to_string())
        })?;

        let env = match self.env_prefix.as_deref() {
            Some(prefix) => Env::prefixed(prefix),
            None => Env::raw(),
        }
        .split("_");
        env.data().map_err(|e| {
            error!(error = %e, "error loading environment overrides");
            SchedulerError::FileLoad(e.to_string())
        })?;

        let config: Config = Figment::new()
            .merge(file)
            .merge(dotenv)
            .merge(env)
            .extract()
            .inspect_err(|e| error!(error = %e, "config unmarshal error"))?;

        config
            .validate()
            .inspect_err(|e| error!(error = %e, "error while validating config"))?;

        info!(path = %self.config_file.display(), "config loaded");
        Ok(config)
    }

    /// Read the dotenv file into a provider layer. Failures are logged and
    /// yield an empty layer.
    fn dotenv_layer(&self, path: &Path) -> Figment {
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load environment file");
                return Figment::new();
            }
        };

        let mut layer = Figment::new();
        for item in iter {
            let (name, raw) = match item {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed environment file line");
                    continue;
                }
            };
            let Some(key) = env_key_path(&name, self.env_prefix.as_deref()) else {
                continue;
            };
            let value: Value = raw.parse().unwrap_or_else(|_| Value::from(raw.clone()));
            debug!(variable = %name, key = %key, "environment file override");
            layer = layer.merge(Serialized::default(&key, value));
        }
        layer
    }
}

/// Map an environment variable name onto a dotted config path, honoring
/// an optional case-insensitive prefix.
fn env_key_path(name: &str, prefix: Option<&str>) -> Option<String> {
    let rest = match prefix {
        Some(prefix) => match name.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(prefix) => &name[prefix.len()..],
            _ => return None,
        },
        None => name,
    };
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_ascii_lowercase().replace('_', "."))
}
