//! # Level of Detail
//!
//! Settings consumed by render actions. The coalescer stores them and hands
//! a snapshot to every render; changing them never schedules a render.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::render::RenderSettings;

/// Largest accepted `max_lod`. One shading flag is stored per level.
pub const MAX_LOD_LIMIT: u32 = 255;

/// Phong-style shading coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingValues {
    /// Ambient coefficient.
    pub ambient: f32,
    /// Diffuse coefficient.
    pub diffuse: f32,
    /// Specular coefficient.
    pub specular: f32,
    /// Specular power.
    pub specular_power: f32,
}

impl Default for ShadingValues {
    fn default() -> Self {
        Self {
            ambient: 0.1,
            diffuse: 1.0,
            specular: 0.2,
            specular_power: 10.0,
        }
    }
}

impl ShadingValues {
    /// Coefficients as `[ambient, diffuse, specular, specular_power]`.
    #[must_use]
    pub const fn as_array(&self) -> [f32; 4] {
        [self.ambient, self.diffuse, self.specular, self.specular_power]
    }
}

/// Current LOD, its bound, per-LOD shading flags and the clipping flag.
///
/// Invariant: `current <= max` and `shading_enabled.len() == max + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelOfDetail {
    current: u32,
    max: u32,
    shading_enabled: Vec<bool>,
    shading_values: ShadingValues,
    clipping_plane: bool,
    number_of_3d_targets: usize,
}

impl Default for LevelOfDetail {
    fn default() -> Self {
        Self {
            current: 0,
            max: 1,
            shading_enabled: vec![false, true],
            shading_values: ShadingValues::default(),
            clipping_plane: false,
            number_of_3d_targets: 0,
        }
    }
}

impl LevelOfDetail {
    /// Creates settings with `max` as the highest LOD and every shading flag off.
    /// `max` is clamped to [`MAX_LOD_LIMIT`].
    #[must_use]
    pub fn new(max: u32) -> Self {
        let max = max.min(MAX_LOD_LIMIT);
        Self {
            max,
            shading_enabled: vec![false; max as usize + 1],
            ..Self::default()
        }
    }

    /// Current LOD.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Sets the current LOD.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::LodOutOfRange`] if `lod > max`.
    pub fn set_current(&mut self, lod: u32) -> Result<(), ConfigurationError> {
        if lod > self.max {
            return Err(ConfigurationError::LodOutOfRange {
                lod,
                max_lod: self.max,
            });
        }
        self.current = lod;
        Ok(())
    }

    /// Highest valid LOD.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Changes the highest LOD.
    ///
    /// Shading flags are grown (new levels off) or truncated positionally,
    /// and the current LOD is clamped into the new range.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::MaxLodTooLarge`] if `max > MAX_LOD_LIMIT`.
    pub fn set_max(&mut self, max: u32) -> Result<(), ConfigurationError> {
        if max > MAX_LOD_LIMIT {
            return Err(ConfigurationError::MaxLodTooLarge {
                max_lod: max,
                limit: MAX_LOD_LIMIT,
            });
        }
        self.max = max;
        self.shading_enabled.resize(max as usize + 1, false);
        self.current = self.current.min(max);
        Ok(())
    }

    /// Sets the number of LODs, i.e. `max = count - 1`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidLodCount`] if `count` is zero,
    /// [`ConfigurationError::MaxLodTooLarge`] past [`MAX_LOD_LIMIT`].
    pub fn set_count(&mut self, count: u32) -> Result<(), ConfigurationError> {
        if count == 0 {
            return Err(ConfigurationError::InvalidLodCount(count));
        }
        self.set_max(count - 1)
    }

    /// Shading flag of one LOD.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::ShadingIndexOutOfRange`] if `lod > max`.
    pub fn shading(&self, lod: u32) -> Result<bool, ConfigurationError> {
        self.shading_enabled
            .get(lod as usize)
            .copied()
            .ok_or(ConfigurationError::ShadingIndexOutOfRange {
                index: lod,
                len: self.shading_enabled.len(),
            })
    }

    /// Sets the shading flag of one LOD.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::ShadingIndexOutOfRange`] if `lod > max`.
    pub fn set_shading(&mut self, lod: u32, enabled: bool) -> Result<(), ConfigurationError> {
        let len = self.shading_enabled.len();
        let slot = self
            .shading_enabled
            .get_mut(lod as usize)
            .ok_or(ConfigurationError::ShadingIndexOutOfRange { index: lod, len })?;
        *slot = enabled;
        Ok(())
    }

    /// All shading flags, index = LOD.
    #[must_use]
    pub fn shading_flags(&self) -> &[bool] {
        &self.shading_enabled
    }

    /// Shading coefficients.
    #[inline]
    #[must_use]
    pub const fn shading_values(&self) -> ShadingValues {
        self.shading_values
    }

    /// Replaces the shading coefficients.
    pub fn set_shading_values(&mut self, values: ShadingValues) {
        self.shading_values = values;
    }

    /// Clipping plane flag.
    #[inline]
    #[must_use]
    pub const fn clipping_plane(&self) -> bool {
        self.clipping_plane
    }

    /// Sets the clipping plane flag.
    pub fn set_clipping_plane(&mut self, enabled: bool) {
        self.clipping_plane = enabled;
    }

    /// Number of 3D targets reported by the host.
    #[inline]
    #[must_use]
    pub const fn number_of_3d_targets(&self) -> usize {
        self.number_of_3d_targets
    }

    /// Records the number of 3D targets.
    pub fn set_number_of_3d_targets(&mut self, count: usize) {
        self.number_of_3d_targets = count;
    }

    /// Snapshot handed to render actions.
    #[must_use]
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            lod: self.current,
            shading: self
                .shading_enabled
                .get(self.current as usize)
                .copied()
                .unwrap_or(false),
            shading_values: self.shading_values,
            clipping_plane: self.clipping_plane,
            number_of_3d_targets: self.number_of_3d_targets,
        }
    }
}
