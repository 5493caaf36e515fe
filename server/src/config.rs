use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

use crate::jobs::EngineCommand;

const DEFAULT_PORT: &str = "3000";
const DEFAULT_DATA_DIR: &str = "./";
const DEFAULT_PUBLIC_DIR: &str = "public";
const DEFAULT_ENGINE: &str = "python";
const DEFAULT_ENGINE_ARGS: &str = "cluster_logic.py";
const DEFAULT_JOB_TIMEOUT_SECS: &str = "600";
const DEFAULT_SPAWN_RETRIES: &str = "2";
const DEFAULT_MAX_BODY_BYTES: &str = "1073741824"; /* 1GB */
const DEFAULT_MAX_REFERENCE_BYTES: &str = "33554432"; /* 32MB */

#[derive(Error, Debug)]
#[error("Invalid {key} value '{value}': {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub engine: EngineCommand,
    pub job_timeout: Duration,
    pub spawn_retries: u32,
    pub seed_rooms: Vec<String>,
    pub max_body_bytes: usize,
    /// Largest reference photo a search accepts. It is held in memory.
    pub max_reference_bytes: usize,
}

impl Config {
    /// Reads `GENIE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = try_load("GENIE_JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS)?;
        Ok(Self {
            port: try_load("GENIE_PORT", DEFAULT_PORT)?,
            data_dir: PathBuf::from(load("GENIE_DATA_DIR", DEFAULT_DATA_DIR)),
            public_dir: PathBuf::from(load("GENIE_PUBLIC_DIR", DEFAULT_PUBLIC_DIR)),
            engine: EngineCommand {
                program: load("GENIE_ENGINE", DEFAULT_ENGINE),
                args: split_args(&load("GENIE_ENGINE_ARGS", DEFAULT_ENGINE_ARGS)),
            },
            job_timeout: Duration::from_secs(timeout_secs),
            spawn_retries: try_load("GENIE_JOB_SPAWN_RETRIES", DEFAULT_SPAWN_RETRIES)?,
            seed_rooms: split_rooms(&load("GENIE_SEED_ROOMS", "")),
            max_body_bytes: try_load("GENIE_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            max_reference_bytes: try_load(
                "GENIE_MAX_REFERENCE_BYTES",
                DEFAULT_MAX_REFERENCE_BYTES,
            )?,
        })
    }

    /// Defaults rooted at `data_dir`, used by embedders and tests.
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        let data_dir = data_dir.into();
        Self {
            port: 0,
            public_dir: data_dir.join(DEFAULT_PUBLIC_DIR),
            data_dir,
            engine: EngineCommand {
                program: DEFAULT_ENGINE.to_owned(),
                args: split_args(DEFAULT_ENGINE_ARGS),
            },
            job_timeout: Duration::from_secs(600),
            spawn_retries: 2,
            seed_rooms: Vec::new(),
            max_body_bytes: 1024 * 1024 * 1024,
            max_reference_bytes: 32 * 1024 * 1024,
        }
    }
}

fn load(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: '{default}'");
        default.to_string()
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = load(key, default);
    value.parse().map_err(|e: T::Err| ConfigError {
        key,
        reason: e.to_string(),
        value,
    })
}

fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(String::from).collect()
}

fn split_rooms(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}
