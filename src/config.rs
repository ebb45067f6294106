//! Engine configuration.
//!
//! Configuration arrives as a flat name → value map (the same keys a
//! driver would hand a graph algorithm as parameters) and is decoded into a
//! typed [`CommunityConfig`]. Validation happens once, up front: a missing
//! or malformed key fails construction instead of surfacing later inside
//! the per-step loop.
//!
//! ```rust
//! use convoy::config::{CommunityConfig, SpeedType};
//! use serde_json::json;
//!
//! let params = json!({
//!     "speedType": "spacetimemean",
//!     "speedHistoryLength": 10,
//!     "congestionSpeedThreshold": 9.0,
//! });
//! let config = CommunityConfig::from_value(params).unwrap();
//! assert_eq!(config.speed_type, SpeedType::SpaceTimeMean);
//! assert_eq!(config.history_length(), 10);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which speed feeds the history buffer and the mobility score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedType {
    /// Instantaneous speed for scoring; own history for bookkeeping.
    Instant,
    /// Time-mean speed over the agent's own history.
    #[default]
    TimeMean,
    /// Time-mean of same-lane space-mean speeds, with history handed over
    /// between agents on the same lane.
    SpaceTimeMean,
}

/// Named algorithm presets.
///
/// Each preset is a composition of similarity, scoring, token and
/// emergence strategies; see [`crate::community::CommunityAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Algorithm {
    /// Neighbourhood similarity weighted by congestion-gated link
    /// stability, wandering originator, coordinated emergence.
    #[default]
    MobileSandSharc,
    /// Neighbourhood similarity blended with mobility similarity.
    MobileSharc,
    /// Degree-weighted hop-attenuated scores times mobility similarity.
    MobileLeung,
    /// Score propagation times mobility similarity, no attenuation.
    Crowdz,
}

/// Attribute names under which external per-agent and per-link values
/// are exchanged with the graph store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    /// Link weight.
    pub weight: String,
    /// Instantaneous speed.
    pub speed: String,
    /// Heading in degrees.
    pub angle: String,
    /// Derived time-mean speed.
    pub time_mean_speed: String,
    /// Lane or link identity.
    pub lane: String,
    /// Derived change of time-mean speed between steps.
    pub dynamism: String,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CommunityConfig {
    /// Algorithm preset.
    pub algorithm: Algorithm,
    /// Link weight marker.
    pub weight_marker: String,
    /// Instantaneous speed marker.
    pub speed_marker: String,
    /// Heading marker.
    pub angle_marker: String,
    /// Time-mean speed marker.
    pub time_mean_speed_marker: String,
    /// Lane identity marker.
    pub lane_marker: String,
    /// Dynamism marker.
    pub dynamism_marker: String,
    /// Speed history ring length. Required for `spacetimemean`.
    pub speed_history_length: Option<usize>,
    /// Speed source.
    pub speed_type: SpeedType,
    /// Speed at or below which an agent counts as congested.
    pub congestion_speed_threshold: f64,
    /// Share of mobility similarity in the blended similarity, in [0, 1].
    pub mobility_weight: f64,
    /// Degree preference exponent.
    pub m: f64,
    /// Hop attenuation.
    pub delta: f64,
    /// Mobility similarity below which the blended similarity is 0.
    pub mobility_similarity_threshold: f64,
    /// Seed for node shuffling and token walks. Drawn from the OS if unset.
    pub seed: Option<u64>,
    /// Steps an emergence stays pending before the switch, and stays
    /// pinned after it.
    pub emergence_countdown: u32,
    /// Minimum number of entering links for the emergence scan to run.
    pub emergence_min_in_degree: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            weight_marker: "weight".to_string(),
            speed_marker: "speed".to_string(),
            angle_marker: "angle".to_string(),
            time_mean_speed_marker: "timeMeanSpeed".to_string(),
            lane_marker: "lane".to_string(),
            dynamism_marker: "dynamism".to_string(),
            speed_history_length: None,
            speed_type: SpeedType::default(),
            congestion_speed_threshold: 0.0,
            mobility_weight: 0.5,
            m: 0.1,
            delta: 0.05,
            mobility_similarity_threshold: 0.5,
            seed: None,
            emergence_countdown: 2,
            emergence_min_in_degree: 2,
        }
    }
}

impl CommunityConfig {
    /// Decode and validate a flat parameter map.
    pub fn from_params<I, K>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map: Map<String, Value> = params.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::from_value(Value::Object(map))
    }

    /// Decode and validate a JSON object of parameters.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: CommunityConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements and value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.speed_type == SpeedType::SpaceTimeMean && self.speed_history_length.is_none() {
            return Err(Error::MissingConfig {
                key: "speedHistoryLength",
            });
        }
        check_unit("mobilityWeight", self.mobility_weight)?;
        check_unit("mobilitySimilarityThreshold", self.mobility_similarity_threshold)?;
        check_finite("congestionSpeedThreshold", self.congestion_speed_threshold)?;
        check_finite("m", self.m)?;
        check_finite("delta", self.delta)?;
        if self.emergence_countdown == 0 {
            return Err(Error::InvalidParameter {
                name: "emergenceCountdown",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Speed history length, 0 when unset.
    pub fn history_length(&self) -> usize {
        self.speed_history_length.unwrap_or(0)
    }

    /// Attribute names for the graph store.
    pub fn markers(&self) -> Markers {
        Markers {
            weight: self.weight_marker.clone(),
            speed: self.speed_marker.clone(),
            angle: self.angle_marker.clone(),
            time_mean_speed: self.time_mean_speed_marker.clone(),
            lane: self.lane_marker.clone(),
            dynamism: self.dynamism_marker.clone(),
        }
    }

    /// Set the algorithm preset.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the speed source.
    pub fn with_speed_type(mut self, speed_type: SpeedType) -> Self {
        self.speed_type = speed_type;
        self
    }

    /// Set the speed history length.
    pub fn with_history_length(mut self, length: usize) -> Self {
        self.speed_history_length = Some(length);
        self
    }

    /// Set the congestion speed threshold.
    pub fn with_congestion_threshold(mut self, threshold: f64) -> Self {
        self.congestion_speed_threshold = threshold;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for Markers {
    fn default() -> Self {
        CommunityConfig::default().markers()
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            message: format!("must be finite, got {value}"),
        })
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            message: format!("must lie in [0, 1], got {value}"),
        })
    }
}
