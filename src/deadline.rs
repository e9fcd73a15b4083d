//! Deadline clock
//!
//! A plain value carrying the run's start instant and an optional time
//! limit, threaded explicitly through every solver call. The two consumers
//! are the LP backend (which receives `remaining()` as its per-solve time
//! limit) and the message-passing loop (which polls `reached()` between
//! iterations).

use std::time::{Duration, Instant};

/// Stopwatch with an optional limit. Cheap to clone; read-mostly.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Start the stopwatch with no time limit.
    pub fn unlimited() -> Self {
        Self { start: Instant::now(), limit: None }
    }

    /// Start the stopwatch with a limit of `seconds` from now. A limit of
    /// zero is legal and means the deadline is already reached.
    pub fn with_limit(seconds: f64) -> Self {
        Self { start: Instant::now(), limit: Some(Duration::from_secs_f64(seconds.max(0.0))) }
    }

    /// Seconds elapsed since construction.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Seconds left before the deadline; `+inf` when unlimited.
    pub fn remaining(&self) -> f64 {
        match self.limit {
            None => f64::INFINITY,
            Some(limit) => (limit.as_secs_f64() - self.elapsed()).max(0.0),
        }
    }

    /// Whether the time limit has passed.
    pub fn reached(&self) -> bool {
        match self.limit {
            None => false,
            Some(limit) => self.start.elapsed() >= limit,
        }
    }
}
