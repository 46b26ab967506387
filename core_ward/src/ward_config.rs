//! Tunables for the ward engine.
//!
//! Loaded from `ward_tuning.json` with support for an environment variable
//! override; falls back to the builtin copy when nothing loads.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_WARD_TUNING: &str = include_str!("data/ward_tuning.json");

/// Whether a grab-release pass ends the whole per-ward update for the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrabReleasePolicy {
    /// Release holders, then carry on with the remaining update steps.
    #[default]
    ContinueScan,
    /// A release pass that found any holder ends the update early.
    EarlyReturn,
}

/// Runtime tunables for ward behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WardTuning {
    /// Ticks a creature counts as "freshly saved" after a revive or rescue.
    pub revive_cooldown_ticks: u8,
    /// Hard cap on consecutive destruction rescues before a ward gives up.
    pub saving_throw_cap: u32,
    /// Revival budget handed to wards that do not request their own.
    pub default_revivals: u8,
    pub holder_stun_ticks: u32,
    /// Upward launch speed applied on rescue, sized to beat gravity.
    pub launch_impulse: f32,
    pub sync_request_ttl_ticks: u32,
    pub effect_log_limit: usize,
    pub grab_release_policy: GrabReleasePolicy,
}

impl Default for WardTuning {
    fn default() -> Self {
        Self {
            revive_cooldown_ticks: 10,
            saving_throw_cap: 128,
            default_revivals: 3,
            holder_stun_ticks: 12,
            launch_impulse: 12.5,
            sync_request_ttl_ticks: 60,
            effect_log_limit: 64,
            grab_release_policy: GrabReleasePolicy::ContinueScan,
        }
    }
}

impl WardTuning {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_WARD_TUNING).expect("builtin ward tuning should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, WardConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| WardConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let tuning = WardTuning::from_json_str(&contents)?;
        Ok(tuning)
    }
}

#[derive(Debug, Error)]
pub enum WardConfigError {
    #[error("failed to parse ward tuning: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read ward tuning from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle for accessing the active ward tuning.
#[derive(Resource, Debug, Clone)]
pub struct WardTuningHandle(pub Arc<WardTuning>);

impl WardTuningHandle {
    pub fn new(tuning: Arc<WardTuning>) -> Self {
        Self(tuning)
    }

    pub fn get(&self) -> Arc<WardTuning> {
        Arc::clone(&self.0)
    }

    pub fn replace(&mut self, tuning: Arc<WardTuning>) {
        self.0 = tuning;
    }
}

impl Default for WardTuningHandle {
    fn default() -> Self {
        Self(WardTuning::builtin())
    }
}

/// Load ward tuning from the environment override or fall back to builtin.
pub fn load_ward_tuning_from_env() -> Arc<WardTuning> {
    let Some(path) = env::var("WARD_CONFIG_PATH").ok().map(PathBuf::from) else {
        tracing::info!(target: "deathward::config", "ward_tuning.loaded=builtin");
        return WardTuning::builtin();
    };

    match WardTuning::from_file(&path) {
        Ok(tuning) => {
            tracing::info!(
                target: "deathward::config",
                path = %path.display(),
                "ward_tuning.loaded=file"
            );
            Arc::new(tuning)
        }
        Err(err) => {
            tracing::warn!(
                target: "deathward::config",
                path = %path.display(),
                error = %err,
                "ward_tuning.load_failed"
            );
            WardTuning::builtin()
        }
    }
}
