//! Agent and link records.

use super::attributes::{AttrValue, Attributes};
use crate::community::CommunityState;
use crate::config::Markers;
use crate::error::{Error, Result};
use crate::mobility::congestion::LaneTracker;
use crate::mobility::{HistoryProvenance, SpeedHistory, TimeMeanSpeed};

/// Derived mobility bookkeeping, owned by [`crate::mobility::CongestionMeasure`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MobilityState {
    /// Speed history; created on the first measurement.
    pub history: Option<SpeedHistory>,
    /// Where the history came from during the last measurement.
    pub provenance: HistoryProvenance,
    /// Time-mean speed as of the last measurement.
    pub time_mean: Option<TimeMeanSpeed>,
    /// Change of time-mean speed over the last measurement.
    pub dynamism: Option<f64>,
    /// Lane bookkeeping; absent until a lane has been observed.
    pub lane: Option<LaneTracker>,
}

/// A mobile agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    name: String,
    /// Instantaneous speed, external input.
    pub speed: Option<f64>,
    /// Heading in degrees, external input.
    pub heading: Option<f64>,
    /// Lane identity, external input.
    pub lane: Option<String>,
    /// Derived mobility bookkeeping.
    pub mobility: MobilityState,
    /// Community membership.
    pub community: CommunityState,
    /// Everything else.
    pub attributes: Attributes,
}

impl Agent {
    /// New agent with no readings and no community.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            speed: None,
            heading: None,
            lane: None,
            mobility: MobilityState::default(),
            community: CommunityState::default(),
            attributes: Attributes::new(),
        }
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the instantaneous speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Set the heading.
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Set the lane.
    pub fn with_lane(mut self, lane: impl Into<String>) -> Self {
        self.lane = Some(lane.into());
        self
    }

    /// Time-mean speed, 0.0 before the first measurement.
    pub fn time_mean_speed(&self) -> f64 {
        self.mobility.time_mean.map_or(0.0, |t| t.mean)
    }

    /// Set an attribute by marker name.
    ///
    /// The speed, angle and lane markers are routed to the typed fields;
    /// derived markers (time-mean speed, dynamism) are read-only.
    pub fn set_attribute(
        &mut self,
        markers: &Markers,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let value = value.into();
        if name == markers.speed {
            self.speed = Some(number(&value, "speed")?);
        } else if name == markers.angle {
            self.heading = Some(number(&value, "angle")?);
        } else if name == markers.lane {
            self.lane = Some(value.as_text().ok_or_else(|| Error::InvalidParameter {
                name: "lane",
                message: format!("expected a lane id, got {value:?}"),
            })?);
        } else if name == markers.time_mean_speed || name == markers.dynamism {
            return Err(Error::InvalidParameter {
                name: "marker",
                message: format!("'{name}' is derived and cannot be set"),
            });
        } else {
            self.attributes.set(name, value);
        }
        Ok(())
    }

    /// Read an attribute by marker name, including derived values.
    pub fn attribute(&self, markers: &Markers, name: &str) -> Option<AttrValue> {
        if name == markers.speed {
            self.speed.map(AttrValue::from)
        } else if name == markers.angle {
            self.heading.map(AttrValue::from)
        } else if name == markers.lane {
            self.lane.clone().map(AttrValue::from)
        } else if name == markers.time_mean_speed {
            self.mobility.time_mean.map(|t| AttrValue::from(t.mean))
        } else if name == markers.dynamism {
            self.mobility.dynamism.map(AttrValue::from)
        } else {
            self.attributes.get(name).cloned()
        }
    }

    /// Clear an attribute by marker name. Derived values are untouched.
    pub fn remove_attribute(&mut self, markers: &Markers, name: &str) -> Option<AttrValue> {
        if name == markers.speed {
            self.speed.take().map(AttrValue::from)
        } else if name == markers.angle {
            self.heading.take().map(AttrValue::from)
        } else if name == markers.lane {
            self.lane.take().map(AttrValue::from)
        } else {
            self.attributes.remove(name)
        }
    }
}

/// A directed link. A link `b → a` is an entering link of `a`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Link {
    /// Weight; written by the community pass when mobility weighting is on.
    pub weight: Option<f64>,
    /// Number of edge passes the link has survived.
    pub duration: u64,
    /// Everything else.
    pub attributes: Attributes,
}

impl Link {
    /// Read an attribute by marker name, including the weight.
    pub fn attribute(&self, markers: &Markers, name: &str) -> Option<AttrValue> {
        if name == markers.weight {
            self.weight.map(AttrValue::from)
        } else {
            self.attributes.get(name).cloned()
        }
    }

    /// Set an attribute by marker name; the weight marker sets the weight.
    pub fn set_attribute(
        &mut self,
        markers: &Markers,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let value = value.into();
        if name == markers.weight {
            self.weight = Some(number(&value, "weight")?);
        } else {
            self.attributes.set(name, value);
        }
        Ok(())
    }
}

fn number(value: &AttrValue, name: &'static str) -> Result<f64> {
    value.as_number().ok_or_else(|| Error::InvalidParameter {
        name,
        message: format!("expected a number, got {value:?}"),
    })
}
