use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Per-subscription channel capacity in bytes (8 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
/// Read size used when pumping a source into a pipe.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;

/// Top-level config (multicast.toml + MULTICAST_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MulticastConfig {
    #[serde(default)]
    pub pipe: PipeConfig,
}

/// Broadcast pipe tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipeConfig {
    /// Bytes a single subscriber may have buffered before the producer blocks.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Bytes read from the source per write when pumping.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl MulticastConfig {
    /// Load config from a TOML file with MULTICAST_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.multicast/multicast.toml
    ///
    /// A missing file is not an error; defaults fill every absent key.
    /// Nested keys use a double underscore: `MULTICAST_PIPE__BUFFER_SIZE=65536`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MulticastConfig = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MULTICAST_").split("__"))
            .extract()
            .map_err(|e| crate::error::MulticastError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.pipe.buffer_size == 0 {
            return Err(crate::error::MulticastError::Config(
                "pipe.buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.pipe.chunk_size == 0 {
            return Err(crate::error::MulticastError::Config(
                "pipe.chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.multicast/multicast.toml", home)
}
