use crate::alphabet::SupportedAlphabet;
use crate::app_dirs::AppDirs;
use crate::engine::UnrecognizedPolicy;
use crate::error::{Error, Result};
use crate::samples::{
    EvictionPolicy, DEFAULT_MAX_SAMPLES, DEFAULT_THRESHOLD_FACTOR, DEFAULT_THRESHOLD_FLOOR,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub alphabet: SupportedAlphabet,
    pub max_samples_per_character: usize,
    pub threshold_floor: f64,
    pub threshold_factor: f64,
    pub eviction: EvictionPolicy,
    pub unrecognized: UnrecognizedPolicy,
    /// Characters with fewer attempts are left out of best/weakest rankings
    pub min_attempts_for_ranking: u32,
    pub ranking_size: usize,
    pub recognizer_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alphabet: SupportedAlphabet::default(),
            max_samples_per_character: DEFAULT_MAX_SAMPLES,
            threshold_floor: DEFAULT_THRESHOLD_FLOOR,
            threshold_factor: DEFAULT_THRESHOLD_FACTOR,
            eviction: EvictionPolicy::default(),
            unrecognized: UnrecognizedPolicy::default(),
            min_attempts_for_ranking: 3,
            ranking_size: 5,
            recognizer_timeout_ms: 5000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_samples_per_character == 0 {
            return Err(Error::InvalidConfig(
                "max_samples_per_character must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold_floor) {
            return Err(Error::InvalidConfig(format!(
                "threshold_floor {} is outside [0, 1]",
                self.threshold_floor
            )));
        }
        if !(self.threshold_factor > 0.0 && self.threshold_factor <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "threshold_factor {} is outside (0, 1]",
                self.threshold_factor
            )));
        }
        Ok(())
    }

    pub fn recognizer_timeout(&self) -> Duration {
        Duration::from_millis(self.recognizer_timeout_ms)
    }
}

pub trait ConfigStore {
    fn load(&self) -> EngineConfig;
    fn save(&self, cfg: &EngineConfig) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("letterdrill_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> EngineConfig {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<EngineConfig>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config"),
            }
        }
        EngineConfig::default()
    }

    fn save(&self, cfg: &EngineConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
