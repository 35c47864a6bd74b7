//! # Coalescer Configuration
//!
//! Loaded once at startup, usually from TOML:
//!
//! ```toml
//! tick_interval_ms = 16
//! number_of_3d_targets = 1
//!
//! [lod]
//! max_lod = 2
//! initial_lod = 0
//! shading_enabled = [false, true, true]
//! clipping_plane = false
//!
//! [lod.shading]
//! ambient = 0.1
//! diffuse = 1.0
//! specular = 0.2
//! specular_power = 10.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::lod::{LevelOfDetail, ShadingValues, MAX_LOD_LIMIT};

/// Level-of-detail section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Highest LOD.
    pub max_lod: u32,
    /// LOD used until someone changes it.
    pub initial_lod: u32,
    /// Shading flag per LOD. Missing levels are off, extra levels are an error.
    pub shading_enabled: Vec<bool>,
    /// Clipping plane flag.
    pub clipping_plane: bool,
    /// Shading coefficients.
    pub shading: ShadingValues,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            max_lod: 1,
            initial_lod: 0,
            shading_enabled: vec![false, true],
            clipping_plane: false,
            shading: ShadingValues::default(),
        }
    }
}

/// Configuration of one coalescer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescerConfig {
    /// Number of 3D targets handed to render actions.
    pub number_of_3d_targets: usize,
    /// Cadence a platform timer should drive the processing pass at.
    pub tick_interval_ms: u64,
    /// Upper bound on `monitor` calls while a forced update waits.
    pub max_forced_monitor_ticks: u32,
    /// Capacity of observer event channels.
    pub event_channel_capacity: usize,
    /// Level-of-detail settings.
    pub lod: LodConfig,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            number_of_3d_targets: 0,
            tick_interval_ms: 16, // ~60 passes per second
            max_forced_monitor_ticks: 1024,
            event_channel_capacity: 256,
            lod: LodConfig::default(),
        }
    }
}

impl CoalescerConfig {
    /// Parses a TOML document and validates it.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::Parse`] for malformed TOML, otherwise whatever
    /// [`CoalescerConfig::validate`] reports.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::Io`] if the file cannot be read, otherwise see
    /// [`CoalescerConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigurationError> {
        toml::to_string(self).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::LodOutOfRange`] if the initial LOD exceeds the
    /// maximum, [`ConfigurationError::InvalidConfig`] for everything else.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.lod.max_lod > MAX_LOD_LIMIT {
            return Err(ConfigurationError::MaxLodTooLarge {
                max_lod: self.lod.max_lod,
                limit: MAX_LOD_LIMIT,
            });
        }
        if self.lod.initial_lod > self.lod.max_lod {
            return Err(ConfigurationError::LodOutOfRange {
                lod: self.lod.initial_lod,
                max_lod: self.lod.max_lod,
            });
        }
        if self.lod.shading_enabled.len() > self.lod.max_lod as usize + 1 {
            return Err(ConfigurationError::InvalidConfig(format!(
                "{} shading flags for {} levels of detail",
                self.lod.shading_enabled.len(),
                self.lod.max_lod + 1
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "tick_interval_ms must be positive".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "event_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Builds the initial level-of-detail state.
    ///
    /// # Errors
    ///
    /// See [`CoalescerConfig::validate`].
    pub fn level_of_detail(&self) -> Result<LevelOfDetail, ConfigurationError> {
        self.validate()?;
        let mut lod = LevelOfDetail::new(self.lod.max_lod);
        for (index, enabled) in (0u32..).zip(&self.lod.shading_enabled) {
            lod.set_shading(index, *enabled)?;
        }
        lod.set_current(self.lod.initial_lod)?;
        lod.set_shading_values(self.lod.shading);
        lod.set_clipping_plane(self.lod.clipping_plane);
        lod.set_number_of_3d_targets(self.number_of_3d_targets);
        Ok(lod)
    }
}
