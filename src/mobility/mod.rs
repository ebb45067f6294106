//! Mobility similarity between agents.
//!
//! Two agents are mobility-similar when they head the same way at
//! comparable speeds. Both factors are mapped to [0, 1] and multiplied:
//!
//! ```text
//! heading_agreement(a, b) = cos(a - b) * 0.5 + 0.5        (degrees)
//! speed_ratio(u, v)       = min(u, v) / max(u, v)
//! spatial_dependence      = heading_agreement * speed_ratio
//! ```
//!
//! | Heading difference | Agreement |
//! |--------------------|-----------|
//! | 0°                 | 1.0       |
//! | 90°                | 0.5       |
//! | 180°               | 0.0       |
//!
//! A stopped agent is not a zero-speed agent for ratio purposes: a single
//! zero speed is floored to [`SPEED_FLOOR`] so that a vehicle waiting at a
//! light keeps a small, non-zero similarity with the queue moving off
//! around it. Two stopped agents are fully similar.
//!
//! The congestion variant adds a hard regime gate: agents on opposite
//! sides of the congestion speed threshold score 0 whatever their
//! headings.
//!
//! ## Submodules
//!
//! - [`history`]: per-agent speed ring buffer and time-mean speed.
//! - [`congestion`]: per-step lane, stop, history and link bookkeeping.

pub mod congestion;
pub mod history;

pub use congestion::CongestionMeasure;
pub use history::{HistoryProvenance, SpeedHistory, TimeMeanSpeed};

/// Speed substituted for exactly one zero speed in [`speed_ratio`].
pub const SPEED_FLOOR: f64 = 0.1;

/// How two agents' mobility is compared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MobilityMetric {
    /// Heading agreement times speed ratio.
    Spatial,
    /// [`MobilityMetric::Spatial`], gated to 0 when the agents are in
    /// different traffic regimes relative to `threshold`.
    Congestion {
        /// Speed at or below which an agent counts as congested.
        threshold: f64,
    },
}

impl MobilityMetric {
    /// Score two agents given their speeds and headings (degrees).
    pub fn score(&self, speed_a: f64, speed_b: f64, angle_a: f64, angle_b: f64) -> f64 {
        match *self {
            MobilityMetric::Spatial => spatial_dependence(speed_a, speed_b, angle_a, angle_b),
            MobilityMetric::Congestion { threshold } => {
                congestion_dependence(speed_a, speed_b, angle_a, angle_b, threshold)
            }
        }
    }
}

/// Ratio of the slower to the faster speed, in [0, 1].
///
/// Returns 1.0 when both speeds are exactly zero. When exactly one is
/// zero it is replaced by [`SPEED_FLOOR`] first, so the ratio is never 0
/// for non-negative inputs.
pub fn speed_ratio(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 1.0;
    }
    let a = if a == 0.0 { SPEED_FLOOR } else { a.abs() };
    let b = if b == 0.0 { SPEED_FLOOR } else { b.abs() };
    a.min(b) / a.max(b)
}

/// Directional agreement of two headings in degrees, in [0, 1].
///
/// 1 for identical headings, 0.5 for perpendicular, 0 for opposite.
pub fn heading_agreement(angle_a: f64, angle_b: f64) -> f64 {
    let a = angle_a.rem_euclid(360.0);
    let b = angle_b.rem_euclid(360.0);
    let cos = (a - b).to_radians().cos();
    (cos * 0.5 + 0.5).clamp(0.0, 1.0)
}

/// Degree of spatial dependence: `heading_agreement * speed_ratio`.
pub fn spatial_dependence(speed_a: f64, speed_b: f64, angle_a: f64, angle_b: f64) -> f64 {
    heading_agreement(angle_a, angle_b) * speed_ratio(speed_a, speed_b)
}

/// Degree of congestion dependence.
///
/// Equal to [`spatial_dependence`] when both speeds are at or below
/// `threshold`, or both are above it. Exactly 0 when they straddle it.
pub fn congestion_dependence(
    speed_a: f64,
    speed_b: f64,
    angle_a: f64,
    angle_b: f64,
    threshold: f64,
) -> f64 {
    let congested_a = speed_a <= threshold;
    let congested_b = speed_b <= threshold;
    if congested_a != congested_b {
        return 0.0;
    }
    spatial_dependence(speed_a, speed_b, angle_a, angle_b)
}
