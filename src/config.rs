//! Resolved runtime configuration, assembled once from parsed CLI args and
//! threaded into the pool, queues, and server loop as the single source of
//! truth for this process's lifetime.

use crate::cli::ServeArgs;
use crate::model::ModelSpec;

pub struct Config {
    pub models: Vec<ModelSpec>,
    pub socket: String,
    pub queue_size: usize,
    pub workers: usize,
    pub driver: String,
    pub port: Option<u16>,
}

#[derive(Debug)]
pub enum ConfigError {
    NoModels,
    BadModelSpec(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoModels => write!(f, "at least one model-spec is required"),
            ConfigError::BadModelSpec(s) => write!(f, "invalid model spec: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_args(args: ServeArgs) -> Result<Self, ConfigError> {
        if args.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let models = args
            .models
            .iter()
            .map(|s| s.parse::<ModelSpec>().map_err(ConfigError::BadModelSpec))
            .collect::<Result<Vec<_>, _>>()?;
        let workers = args.workers.unwrap_or_else(|| models.len().min(8).max(1));
        Ok(Self {
            models,
            socket: args.socket,
            queue_size: args.queue_size,
            workers,
            driver: args.driver,
            port: args.port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(models: Vec<&str>) -> ServeArgs {
        ServeArgs {
            models: models.into_iter().map(String::from).collect(),
            socket: "/tmp/granville.sock".to_string(),
            queue_size: 1000,
            workers: None,
            driver: "stub".to_string(),
            port: None,
        }
    }

    #[test]
    fn default_worker_count_matches_model_count_up_to_eight() {
        let cfg = Config::from_args(args(vec!["a.gguf", "b.gguf"])).unwrap();
        assert_eq!(cfg.workers, 2);
    }

    #[test]
    fn worker_count_caps_at_eight() {
        let models = vec!["a"; 20];
        let cfg = Config::from_args(args(models)).unwrap();
        assert_eq!(cfg.workers, 8);
    }

    #[test]
    fn no_models_is_an_error() {
        assert!(Config::from_args(args(vec![])).is_err());
    }

    #[test]
    fn explicit_worker_count_overrides_default() {
        let mut a = args(vec!["a.gguf"]);
        a.workers = Some(3);
        let cfg = Config::from_args(a).unwrap();
        assert_eq!(cfg.workers, 3);
    }
}
