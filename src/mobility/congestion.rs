//! Per-step mobility bookkeeping.
//!
//! [`CongestionMeasure`] runs before the community pass on every step and
//! refreshes, for each agent:
//!
//! 1. lane bookkeeping (current/previous lane, stops, probes),
//! 2. the speed history,
//! 3. the time-mean speed and its change since the last step (dynamism).
//!
//! Under [`SpeedType::SpaceTimeMean`] the value pushed into the history is
//! the space-mean speed of the agent's lane (the mean instantaneous speed
//! of the agent and its same-lane neighbours), and the history itself is
//! tied to the lane rather than to the vehicle: an agent that just changed
//! lane discards its own history and copies the richest history among the
//! neighbours that have stayed on its new lane.
//!
//! | Situation                                   | History used           |
//! |---------------------------------------------|------------------------|
//! | same lane as last step, history present     | own                    |
//! | lane changed, or no history yet             | best neighbour's copy  |
//! | no same-lane neighbour with copyable data   | fresh, empty           |
//!
//! An agent with no lane cannot be placed under space-time-mean and is
//! skipped for the step with [`Error::MissingField`]; the skip is logged
//! and returned to the caller.
//!
//! Agents are visited in an order shuffled by the measure's own seeded
//! RNG. A neighbour's lane tracker reads differently depending on whether
//! it was already observed this step, so a fixed order would always favour
//! the same agents when a lane changer picks its history source.

use super::history::{HistoryProvenance, SpeedHistory};
use crate::config::{CommunityConfig, SpeedType};
use crate::error::{Error, Result};
use crate::graph::MobilityGraph;
use petgraph::stable_graph::NodeIndex;
use rand::prelude::*;
use tracing::{debug, warn};

/// Speed at or below which an agent counts as stopped.
pub const STOP_SPEED: f64 = 1.0;

/// Minimum number of steps between two counted stops on the same lane.
pub const CYCLE_TIME: u64 = 90;

/// Lane occupancy bookkeeping for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneTracker {
    /// Lane at the latest observation.
    pub current: String,
    /// Lane at the observation before.
    pub previous: String,
    /// Stops counted on the current lane.
    pub stops: u32,
    /// Observations on the current lane.
    pub probes: u32,
    /// Step of the last counted stop on the current lane.
    pub stop_time: Option<u64>,
}

impl LaneTracker {
    /// Tracker that has not yet observed anything on `lane`.
    pub fn new(lane: &str) -> Self {
        Self {
            current: lane.to_string(),
            previous: lane.to_string(),
            stops: 0,
            probes: 0,
            stop_time: None,
        }
    }

    /// Record the agent on `lane` at step `now`.
    ///
    /// Moving to another lane resets the counters. A stop is counted when
    /// the speed is at or below [`STOP_SPEED`] and more than
    /// [`CYCLE_TIME`] steps have passed since the last counted stop.
    pub fn observe(&mut self, lane: &str, speed: Option<f64>, now: u64) {
        if lane != self.current {
            self.previous = std::mem::replace(&mut self.current, lane.to_string());
            self.stops = 0;
            self.probes = 0;
            self.stop_time = None;
        } else {
            self.previous.clone_from(&self.current);
        }
        self.probes += 1;

        if speed.is_some_and(|s| s <= STOP_SPEED) {
            let due = self
                .stop_time
                .map_or(true, |t| now.saturating_sub(t) > CYCLE_TIME);
            if due {
                self.stop_time = Some(now);
                self.stops += 1;
            }
        }
    }

    /// Whether the latest observation was on a different lane.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Refreshes lane, history and time-mean bookkeeping on every agent.
#[derive(Debug, Clone)]
pub struct CongestionMeasure {
    speed_type: SpeedType,
    history_length: usize,
    rng: StdRng,
}

impl CongestionMeasure {
    /// Measure for the given speed source and history length, with an
    /// OS-seeded visit order.
    pub fn new(speed_type: SpeedType, history_length: usize) -> Self {
        Self {
            speed_type,
            history_length,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Measure configured from `config`.
    pub fn from_config(config: &CommunityConfig) -> Self {
        let measure = Self::new(config.speed_type, config.history_length());
        match config.seed {
            Some(seed) => measure.with_seed(seed),
            None => measure,
        }
    }

    /// Fix the visit order.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Speed source.
    pub fn speed_type(&self) -> SpeedType {
        self.speed_type
    }

    /// Measure every agent. Agents that cannot be measured are skipped,
    /// logged, and returned with the reason.
    pub fn compute(&mut self, graph: &mut MobilityGraph) -> Vec<(NodeIndex, Error)> {
        let mut order: Vec<NodeIndex> = graph.agents().collect();
        order.shuffle(&mut self.rng);
        let mut skipped = Vec::new();
        for u in order {
            if let Err(err) = self.compute_node(graph, u) {
                warn!(agent = u.index(), error = %err, "skipping mobility measurement");
                skipped.push((u, err));
            }
        }
        skipped
    }

    /// Measure one agent at the graph's current step.
    pub fn compute_node(&self, graph: &mut MobilityGraph, u: NodeIndex) -> Result<()> {
        let now = graph.step();
        let Some(agent) = graph.agent_mut(u) else {
            return Ok(());
        };
        let speed = agent.speed;
        match agent.lane.clone() {
            Some(lane) => agent
                .mobility
                .lane
                .get_or_insert_with(|| LaneTracker::new(&lane))
                .observe(&lane, speed, now),
            None if self.speed_type == SpeedType::SpaceTimeMean => {
                return Err(Error::MissingField {
                    agent: agent.name().to_string(),
                    field: "lane",
                });
            }
            None => {}
        }
        let own = match self.speed_type {
            SpeedType::SpaceTimeMean => None,
            SpeedType::Instant | SpeedType::TimeMean => agent.mobility.history.take(),
        };

        let (mut history, provenance, reading) = match self.speed_type {
            SpeedType::SpaceTimeMean => {
                let (history, provenance) = self.lane_history(graph, u, now);
                (history, provenance, space_mean_speed(graph, u))
            }
            SpeedType::Instant | SpeedType::TimeMean => {
                let history = own.unwrap_or_else(|| SpeedHistory::new(self.history_length));
                (history, HistoryProvenance::Own, speed.unwrap_or(0.0))
            }
        };

        history.push(reading, now);
        let mut time_mean = history.time_mean_speed(now);
        if history.capacity() == 0 {
            // Without a history the latest reading stands in for the mean.
            time_mean.mean = reading;
        }

        let Some(agent) = graph.agent_mut(u) else {
            return Ok(());
        };
        if provenance != HistoryProvenance::Own {
            debug!(
                agent = agent.name(),
                provenance = provenance.as_counter(),
                step = now,
                "lane history replaced"
            );
        }
        let state = &mut agent.mobility;
        let previous = state.time_mean.map(|t| t.mean);
        state.dynamism = Some(previous.map_or(0.0, |p| time_mean.mean - p));
        state.time_mean = Some(time_mean);
        state.history = Some(history);
        state.provenance = provenance;
        Ok(())
    }

    fn lane_history(
        &self,
        graph: &MobilityGraph,
        u: NodeIndex,
        now: u64,
    ) -> (SpeedHistory, HistoryProvenance) {
        let Some(agent) = graph.agent(u) else {
            return (SpeedHistory::new(self.history_length), HistoryProvenance::Reset);
        };
        let changed = agent.mobility.lane.as_ref().map_or(true, LaneTracker::changed);
        if !changed {
            if let Some(own) = &agent.mobility.history {
                return (own.clone(), HistoryProvenance::Own);
            }
        }

        match best_history_source(graph, u, now) {
            Some((v, records)) if records > 0 => {
                let copy = graph
                    .agent(v)
                    .and_then(|n| n.mobility.history.as_ref())
                    .map(|h| h.copy_recent(now));
                match copy {
                    Some(copy) => (copy, HistoryProvenance::Copied(records)),
                    None => (SpeedHistory::new(self.history_length), HistoryProvenance::Reset),
                }
            }
            _ => (SpeedHistory::new(self.history_length), HistoryProvenance::Reset),
        }
    }
}

/// Mean instantaneous speed over `u` and its entering neighbours on the
/// same lane. Missing speeds count as 0.0. An agent with no lane gets its
/// own speed.
pub fn space_mean_speed(graph: &MobilityGraph, u: NodeIndex) -> f64 {
    let Some(agent) = graph.agent(u) else {
        return 0.0;
    };
    let own = agent.speed.unwrap_or(0.0);
    let Some(lane) = agent.lane.as_deref() else {
        return own;
    };
    let mut sum = own;
    let mut count = 1usize;
    for v in graph.entering(u) {
        if let Some(n) = graph.agent(v) {
            if n.lane.as_deref() == Some(lane) {
                sum += n.speed.unwrap_or(0.0);
                count += 1;
            }
        }
    }
    sum / count as f64
}

/// Entering neighbour of `u` that stayed on `u`'s lane and offers the
/// most copyable readings at `now`. Ties go to the first neighbour seen.
fn best_history_source(graph: &MobilityGraph, u: NodeIndex, now: u64) -> Option<(NodeIndex, usize)> {
    let lane = graph.agent(u)?.lane.as_deref()?;
    let mut best: Option<(NodeIndex, usize)> = None;
    for v in graph.entering(u) {
        let Some(n) = graph.agent(v) else { continue };
        let Some(tracker) = n.mobility.lane.as_ref() else { continue };
        if tracker.current != lane || tracker.changed() {
            continue;
        }
        let Some(history) = n.mobility.history.as_ref() else { continue };
        let records = history.copyable_records(now);
        if best.map_or(true, |(_, r)| records > r) {
            best = Some((v, records));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure_steps(measure: &mut CongestionMeasure, graph: &mut MobilityGraph, steps: u64) {
        for _ in 0..steps {
            graph.advance_step();
            assert!(measure.compute(graph).is_empty());
        }
    }

    #[test]
    fn test_lane_tracker_counts_stops_per_cycle() {
        let mut t = LaneTracker::new("x");
        t.observe("x", Some(0.5), 10);
        assert_eq!((t.stops, t.probes, t.stop_time), (1, 1, Some(10)));
        assert!(!t.changed());

        t.observe("x", Some(0.0), 50);
        assert_eq!((t.stops, t.probes), (1, 2));

        t.observe("x", Some(0.5), 101);
        assert_eq!((t.stops, t.probes, t.stop_time), (2, 3, Some(101)));

        t.observe("y", Some(20.0), 102);
        assert!(t.changed());
        assert_eq!((t.stops, t.probes, t.stop_time), (0, 1, None));
        assert_eq!(t.previous, "x");

        t.observe("y", None, 103);
        assert!(!t.changed());
    }

    #[test]
    fn test_space_mean_speed_uses_same_lane_only() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        let c = g.add_agent("c").unwrap();
        g.connect(a, b);
        g.connect(a, c);
        for (idx, speed, lane) in [(a, 10.0, "x"), (b, 20.0, "x"), (c, 50.0, "y")] {
            let agent = g.agent_mut(idx).unwrap();
            agent.speed = Some(speed);
            agent.lane = Some(lane.to_string());
        }
        assert_eq!(space_mean_speed(&g, a), 15.0);
        assert_eq!(space_mean_speed(&g, c), 50.0);
    }

    #[test]
    fn test_time_mean_over_own_history() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let mut measure = CongestionMeasure::new(SpeedType::TimeMean, 3);

        for speed in [10.0, 20.0, 30.0, 40.0] {
            g.agent_mut(a).unwrap().speed = Some(speed);
            measure_steps(&mut measure, &mut g, 1);
        }
        let state = &g.agent(a).unwrap().mobility;
        let tms = state.time_mean.unwrap();
        assert_eq!(tms.valid_count, 3);
        assert_eq!(tms.mean, 30.0);
        assert_eq!(state.dynamism, Some(10.0));
        assert_eq!(state.provenance, HistoryProvenance::Own);
    }

    #[test]
    fn test_zero_length_history_falls_back_to_reading() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        g.agent_mut(a).unwrap().speed = Some(12.0);
        let mut measure = CongestionMeasure::new(SpeedType::TimeMean, 0);
        measure_steps(&mut measure, &mut g, 2);
        assert_eq!(g.agent(a).unwrap().time_mean_speed(), 12.0);
        assert_eq!(g.agent(a).unwrap().mobility.dynamism, Some(0.0));
    }

    #[test]
    fn test_lane_change_copies_neighbor_history() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        g.connect(a, b);
        {
            let agent = g.agent_mut(a).unwrap();
            agent.speed = Some(10.0);
            agent.lane = Some("x".to_string());
        }
        {
            let agent = g.agent_mut(b).unwrap();
            agent.speed = Some(20.0);
            agent.lane = Some("y".to_string());
        }
        let mut measure = CongestionMeasure::new(SpeedType::SpaceTimeMean, 4);
        measure_steps(&mut measure, &mut g, 3);

        g.agent_mut(b).unwrap().lane = Some("x".to_string());
        measure_steps(&mut measure, &mut g, 1);

        let a_state = &g.agent(a).unwrap().mobility;
        assert_eq!(a_state.provenance, HistoryProvenance::Own);
        let a_readings: Vec<_> = a_state.history.as_ref().unwrap().readings().collect();
        assert_eq!(a_readings, vec![(10.0, 1), (10.0, 2), (10.0, 3), (15.0, 4)]);

        let b_state = &g.agent(b).unwrap().mobility;
        assert_eq!(b_state.provenance, HistoryProvenance::Copied(3));
        let tms = b_state.time_mean.unwrap();
        assert_eq!(tms.valid_count, 4);
        assert_eq!(tms.mean, 11.25);
    }

    fn lane_swap(seed: u64) -> (MobilityGraph, Vec<NodeIndex>) {
        let mut g = MobilityGraph::new();
        // The changer is inserted first so index order would visit it first.
        let cars: Vec<NodeIndex> = ["changer", "x0", "x1", "leaver"]
            .into_iter()
            .map(|name| g.add_agent(name).unwrap())
            .collect();
        for (i, &a) in cars.iter().enumerate() {
            for &b in &cars[i + 1..] {
                g.connect(a, b);
            }
        }
        for (&c, lane) in cars.iter().zip(["y", "x", "x", "x"]) {
            let agent = g.agent_mut(c).unwrap();
            agent.speed = Some(12.0);
            agent.lane = Some(lane.to_string());
        }
        let mut measure = CongestionMeasure::new(SpeedType::SpaceTimeMean, 6).with_seed(seed);
        measure_steps(&mut measure, &mut g, 3);
        g.agent_mut(cars[0]).unwrap().lane = Some("x".to_string());
        g.agent_mut(cars[3]).unwrap().lane = Some("y".to_string());
        measure_steps(&mut measure, &mut g, 1);
        (g, cars)
    }

    #[test]
    fn test_lane_change_copy_is_seeded_and_order_free_for_stable_sources() {
        for seed in 0..8 {
            let (g, cars) = lane_swap(seed);
            let changer = &g.agent(cars[0]).unwrap().mobility;
            assert_eq!(changer.provenance, HistoryProvenance::Copied(3));
            assert_eq!(changer.time_mean.unwrap().valid_count, 4);
            for &c in &cars[1..3] {
                assert_eq!(g.agent(c).unwrap().mobility.provenance, HistoryProvenance::Own);
            }

            let (again, _) = lane_swap(seed);
            for &c in &cars {
                assert_eq!(
                    g.agent(c).unwrap().mobility.provenance,
                    again.agent(c).unwrap().mobility.provenance
                );
            }
        }
    }

    #[test]
    fn test_lane_change_without_source_resets() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        {
            let agent = g.agent_mut(a).unwrap();
            agent.speed = Some(8.0);
            agent.lane = Some("x".to_string());
        }
        let mut measure = CongestionMeasure::new(SpeedType::SpaceTimeMean, 5);
        measure_steps(&mut measure, &mut g, 3);
        assert_eq!(g.agent(a).unwrap().mobility.provenance, HistoryProvenance::Own);

        g.agent_mut(a).unwrap().lane = Some("z".to_string());
        measure_steps(&mut measure, &mut g, 1);
        let state = &g.agent(a).unwrap().mobility;
        assert_eq!(state.provenance, HistoryProvenance::Reset);
        assert_eq!(state.time_mean.unwrap().valid_count, 1);
    }

    #[test]
    fn test_missing_lane_is_skipped_under_spacetimemean() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        g.agent_mut(b).unwrap().lane = Some("x".to_string());
        g.advance_step();

        let mut measure = CongestionMeasure::new(SpeedType::SpaceTimeMean, 5);
        let skipped = measure.compute(&mut g);
        assert_eq!(
            skipped,
            vec![(
                a,
                Error::MissingField {
                    agent: "a".to_string(),
                    field: "lane"
                }
            )]
        );
        assert!(g.agent(a).unwrap().mobility.history.is_none());
        assert!(g.agent(b).unwrap().mobility.history.is_some());

        // Other speed types do not need a lane.
        let mut measure = CongestionMeasure::new(SpeedType::Instant, 5);
        assert!(measure.compute(&mut g).is_empty());
    }
}
