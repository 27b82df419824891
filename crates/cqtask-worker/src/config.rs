use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{Result, WorkerError};

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Tasks that may wait for the worker before submission is refused.
    pub queue_capacity: usize,
    /// How long `shutdown` waits for the in-flight task.
    pub shutdown_grace_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl WorkerConfig {
    /// Defaults, then `cqtask.toml` if present, then `CQTASK_*` variables.
    pub fn load() -> Result<Self> {
        Self::load_from(Some("cqtask"))
    }

    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("queue_capacity", DEFAULT_QUEUE_CAPACITY as i64)?
            .set_default("shutdown_grace_ms", DEFAULT_SHUTDOWN_GRACE_MS as i64)?;

        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }

        let config: WorkerConfig = builder
            .add_source(Environment::with_prefix("CQTASK").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!("Loaded worker config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(WorkerError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
