//! Error types surfaced by table growth.

use thiserror::Error;

/// Returned when a partition policy cannot provide a bucket count large
/// enough for the requested minimum.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum CapacityError {
    #[error("bucket count cannot grow past {largest} (requested at least {requested})")]
    Exhausted { requested: usize, largest: usize },
}
