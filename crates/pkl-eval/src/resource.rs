//! Evaluation limits: deadline and stack depth.
//!
//! The evaluator checks its tracker at node-execution steps and before
//! pushing frames. [`NoLimitTracker`] monomorphizes every check away;
//! [`LimitedTracker`] enforces a monotonic deadline and a maximum depth.
//! Cancellation is cooperative: in-flight loader calls may complete, but
//! their results are discarded when the deadline has passed.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Default recursion depth limit for [`LimitedTracker`].
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 512;

/// How many `check_time` calls pass between actual clock reads.
const TIME_CHECK_INTERVAL: u32 = 1024;

/// Error returned when an evaluation limit is exceeded.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// The deadline expired.
    Time { limit: Duration, elapsed: Duration },
    /// The recursion depth limit was exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time { limit, elapsed } => {
                write!(f, "evaluation timed out: {elapsed:?} > {limit:?}")
            }
            Self::Recursion { limit, depth } => {
                write!(f, "evaluation stack overflowed: depth {depth} > {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for enforcing evaluation limits.
///
/// Implementations should keep `check_time` cheap: it is called once per
/// evaluated node.
pub trait ResourceTracker: fmt::Debug {
    /// Called at each node-execution step.
    ///
    /// Returns `Err(ResourceError::Time)` once the deadline has passed.
    fn check_time(&mut self) -> Result<(), ResourceError>;

    /// Called before a call or member-force pushes onto the stack.
    ///
    /// # Arguments
    /// * `current_depth` - Depth before the new frame is pushed.
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;
}

/// Tracker that enforces nothing; checks compile away entirely.
#[derive(Debug, Clone, Copy)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, _current_depth: usize) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Tracker enforcing a wall-clock deadline and a recursion depth limit.
///
/// The clock is read every [`TIME_CHECK_INTERVAL`] steps to keep the hot
/// path to a counter increment.
#[derive(Debug)]
pub struct LimitedTracker {
    started: Instant,
    time_limit: Option<Duration>,
    max_depth: usize,
    steps: u32,
}

impl LimitedTracker {
    /// Creates a tracker with the given deadline (measured from now) and
    /// recursion limit.
    #[must_use]
    pub fn new(time_limit: Option<Duration>, max_depth: usize) -> Self {
        Self {
            started: Instant::now(),
            time_limit,
            max_depth,
            steps: 0,
        }
    }

    /// Tracker with a deadline and the default depth limit.
    #[must_use]
    pub fn with_timeout(time_limit: Duration) -> Self {
        Self::new(Some(time_limit), DEFAULT_MAX_RECURSION_DEPTH)
    }
}

impl ResourceTracker for LimitedTracker {
    fn check_time(&mut self) -> Result<(), ResourceError> {
        let Some(limit) = self.time_limit else {
            return Ok(());
        };
        self.steps = self.steps.wrapping_add(1);
        if self.steps % TIME_CHECK_INTERVAL != 0 {
            return Ok(());
        }
        let elapsed = self.started.elapsed();
        if elapsed > limit {
            return Err(ResourceError::Time { limit, elapsed });
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= self.max_depth {
            return Err(ResourceError::Recursion {
                limit: self.max_depth,
                depth: current_depth,
            });
        }
        Ok(())
    }
}
