//! Fixed-length speed history per agent.
//!
//! A [`SpeedHistory`] is a ring buffer of `(speed, timestamp)` slots with a
//! monotonically increasing write cursor. Slots are written at
//! `cursor % capacity`, so after more than `capacity` writes only the most
//! recent `capacity` readings remain.
//!
//! Timestamp 0 marks a slot that was never written. A reading taken at
//! step 0 is therefore indistinguishable from an empty slot and is ignored
//! by every consumer.
//!
//! Two notions of "still valid" are used:
//!
//! - [`SpeedHistory::time_mean_speed`] keeps slots whose age is at most
//!   `capacity` steps.
//! - [`SpeedHistory::copyable_records`] and [`SpeedHistory::copy_recent`]
//!   keep slots strictly younger than `capacity` steps that were not
//!   written during the current step, so a history copied from a
//!   neighbour never includes that neighbour's reading for `now`.

/// Time-mean speed over the valid part of a history.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeMeanSpeed {
    /// Mean of the valid readings (0.0 when there are none).
    pub mean: f64,
    /// Number of valid readings.
    pub valid_count: usize,
}

/// Where an agent's history came from during the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryProvenance {
    /// The agent kept writing to its own buffer.
    #[default]
    Own,
    /// The buffer was reset to empty.
    Reset,
    /// This many readings were copied from a neighbour.
    Copied(usize),
}

impl HistoryProvenance {
    /// Diagnostic counter: -1 for own history, 0 for a reset, the number
    /// of copied readings otherwise.
    pub fn as_counter(&self) -> i64 {
        match *self {
            HistoryProvenance::Own => -1,
            HistoryProvenance::Reset => 0,
            HistoryProvenance::Copied(n) => n as i64,
        }
    }
}

/// Ring buffer of `(speed, timestamp)` readings.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedHistory {
    speeds: Vec<f64>,
    timestamps: Vec<u64>,
    cursor: usize,
}

impl SpeedHistory {
    /// Create an empty history with `capacity` zeroed slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            speeds: vec![0.0; capacity],
            timestamps: vec![0; capacity],
            cursor: 0,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.speeds.len()
    }

    /// Total number of writes since the buffer was created or copied.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Append a reading taken at step `now`.
    ///
    /// A zero-capacity history ignores every write.
    pub fn push(&mut self, speed: f64, now: u64) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        let slot = self.cursor % capacity;
        self.speeds[slot] = speed;
        self.timestamps[slot] = now;
        self.cursor += 1;
    }

    /// Slots in chronological order, oldest first, sentinels included.
    pub fn chronological(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        let capacity = self.capacity();
        (self.cursor..self.cursor + capacity).map(move |i| {
            let slot = i % capacity;
            (self.speeds[slot], self.timestamps[slot])
        })
    }

    /// Written readings in chronological order, oldest first.
    pub fn readings(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.chronological().filter(|&(_, ts)| ts != 0)
    }

    /// Mean speed over readings at most `capacity` steps old.
    pub fn time_mean_speed(&self, now: u64) -> TimeMeanSpeed {
        let window = self.capacity() as u64;
        let mut sum = 0.0;
        let mut valid_count = 0;
        for (speed, ts) in self.readings() {
            if now.saturating_sub(ts) <= window {
                sum += speed;
                valid_count += 1;
            }
        }
        let mean = if valid_count > 0 {
            sum / valid_count as f64
        } else {
            0.0
        };
        TimeMeanSpeed { mean, valid_count }
    }

    fn is_copyable(&self, ts: u64, now: u64) -> bool {
        ts != 0 && ts != now && now.saturating_sub(ts) < self.capacity() as u64
    }

    /// Number of readings a neighbour could copy from this history at `now`.
    pub fn copyable_records(&self, now: u64) -> usize {
        self.readings()
            .filter(|&(_, ts)| self.is_copyable(ts, now))
            .count()
    }

    /// Copy the copyable readings, re-indexed from slot 0 in
    /// chronological order. The copy has the same capacity and its cursor
    /// points just past the last copied reading.
    pub fn copy_recent(&self, now: u64) -> SpeedHistory {
        let mut copy = SpeedHistory::new(self.capacity());
        for (speed, ts) in self.chronological() {
            if self.is_copyable(ts, now) {
                copy.push(speed, ts);
            }
        }
        copy
    }
}
