//! Startup configuration
//!
//! Everything the map needs is decided here and validated once, before any
//! state is constructed. Values can come from code, a JSON document or the
//! process environment (`ATLAS_*` variables).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AtlasError, Result};
use crate::types::Metric;

/// Parameters handed to the external dimensionality reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Output dimensionality. Always 3 for the visualization space.
    pub n_components: usize,
    /// Size of the local neighborhood (larger keeps more global structure)
    pub n_neighbors: usize,
    /// Minimum distance between projected points
    pub min_dist: f32,
    /// Seed for reproducible fits
    pub random_state: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            n_neighbors: 15,
            min_dist: 0.1,
            random_state: 42,
        }
    }
}

impl ProjectionConfig {
    /// Neighborhood size usable for `n_samples` points.
    ///
    /// Reducers cannot look at more neighbors than there are other points,
    /// so small datasets clamp to `n_samples - 1`.
    pub fn effective_neighbors(&self, n_samples: usize) -> usize {
        if n_samples < self.n_neighbors {
            n_samples.saturating_sub(1).max(1)
        } else {
            self.n_neighbors
        }
    }

    /// Copy of these parameters adjusted for `n_samples` points.
    pub fn for_samples(&self, n_samples: usize) -> Self {
        Self {
            n_neighbors: self.effective_neighbors(n_samples),
            ..self.clone()
        }
    }
}

/// Top-level configuration for a [`MapState`](crate::MapState).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Embedding dimension D
    pub dimension: usize,
    pub metric: Metric,
    /// Out-degree used when callers do not pick one
    pub default_k: usize,
    /// Half-width of the normalized coordinate cube
    pub scale: f32,
    pub projection: ProjectionConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            dimension: 512,
            metric: Metric::Cosine,
            default_k: 8,
            scale: 10.0,
            projection: ProjectionConfig::default(),
        }
    }
}

impl AtlasConfig {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(AtlasError::InvalidConfig("dimension must be > 0".into()));
        }
        if self.default_k == 0 {
            return Err(AtlasError::InvalidConfig("default_k must be > 0".into()));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(AtlasError::InvalidConfig(format!(
                "scale must be a positive finite number, got {}",
                self.scale
            )));
        }
        if self.projection.n_components != 3 {
            return Err(AtlasError::InvalidConfig(format!(
                "projection must produce 3 components, got {}",
                self.projection.n_components
            )));
        }
        if self.projection.n_neighbors < 2 {
            return Err(AtlasError::InvalidConfig(
                "projection n_neighbors must be >= 2".into(),
            ));
        }
        if !self.projection.min_dist.is_finite() || self.projection.min_dist < 0.0 {
            return Err(AtlasError::InvalidConfig(
                "projection min_dist must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `ATLAS_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("ATLAS_DIMENSION") {
            config.dimension = parse_var("ATLAS_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("ATLAS_METRIC") {
            config.metric = v.parse()?;
        }
        if let Some(v) = lookup("ATLAS_DEFAULT_K") {
            config.default_k = parse_var("ATLAS_DEFAULT_K", &v)?;
        }
        if let Some(v) = lookup("ATLAS_SCALE") {
            config.scale = parse_var("ATLAS_SCALE", &v)?;
        }
        if let Some(v) = lookup("ATLAS_N_NEIGHBORS") {
            config.projection.n_neighbors = parse_var("ATLAS_N_NEIGHBORS", &v)?;
        }
        if let Some(v) = lookup("ATLAS_MIN_DIST") {
            config.projection.min_dist = parse_var("ATLAS_MIN_DIST", &v)?;
        }
        if let Some(v) = lookup("ATLAS_RANDOM_STATE") {
            config.projection.random_state = parse_var("ATLAS_RANDOM_STATE", &v)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AtlasError::InvalidConfig(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = AtlasConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_k, 8);
        assert_eq!(config.scale, 10.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = AtlasConfig::new(0, Metric::Cosine);
        assert!(matches!(config.validate(), Err(AtlasError::InvalidConfig(_))));

        config.dimension = 4;
        config.scale = f32::NAN;
        assert!(config.validate().is_err());

        config.scale = 10.0;
        config.projection.n_components = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_document() {
        let config = AtlasConfig::from_json_str(r#"{"dimension": 4, "metric": "euclidean"}"#).unwrap();
        assert_eq!(config.dimension, 4);
        assert_eq!(config.metric, Metric::Euclidean);
        assert_eq!(config.projection.n_neighbors, 15);
    }

    #[test]
    fn test_json_invalid_document() {
        let err = AtlasConfig::from_json_str(r#"{"dimension": 0}"#).unwrap_err();
        assert!(matches!(err, AtlasError::InvalidConfig(_)));
        let err = AtlasConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, AtlasError::Serialization(_)));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("ATLAS_DIMENSION", "768"),
            ("ATLAS_METRIC", "euclidean"),
            ("ATLAS_DEFAULT_K", "5"),
            ("ATLAS_N_NEIGHBORS", "30"),
        ]
        .into_iter()
        .collect();

        let config = AtlasConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.dimension, 768);
        assert_eq!(config.metric, Metric::Euclidean);
        assert_eq!(config.default_k, 5);
        assert_eq!(config.projection.n_neighbors, 30);
        assert_eq!(config.scale, 10.0);
    }

    #[test]
    fn test_env_lookup_rejects_garbage() {
        let err = AtlasConfig::from_lookup(|k| (k == "ATLAS_SCALE").then(|| "wide".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ATLAS_SCALE"));
    }

    #[test]
    fn test_effective_neighbors() {
        let projection = ProjectionConfig::default();
        assert_eq!(projection.effective_neighbors(100), 15);
        assert_eq!(projection.effective_neighbors(15), 15);
        assert_eq!(projection.effective_neighbors(4), 3);
        assert_eq!(projection.effective_neighbors(1), 1);
        assert_eq!(projection.for_samples(4).n_neighbors, 3);
    }
}
