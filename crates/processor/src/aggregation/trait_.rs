use crate::error::AggregationResult;
use crate::window::WindowInstance;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Incremental aggregate over the samples of one window
///
/// The function itself is stateless configuration; all state lives in the
/// accumulator so that accumulators can be stored per window, merged and
/// finalized independently:
/// - `create_accumulator` produces the empty state for a new window
/// - `add` folds one input into an accumulator
/// - `merge` combines two partial accumulators of the same key
/// - `finalize` consumes an accumulator and produces the output record
pub trait AggregateFunction: Send + Sync + Debug {
    /// The type of values this aggregate accepts
    type Input;

    /// The internal accumulator state (must be serializable)
    type Accumulator: Clone + Send + Serialize + DeserializeOwned;

    /// The type of the final aggregation result
    type Output;

    /// Create an empty accumulator
    fn create_accumulator(&self) -> Self::Accumulator;

    /// Fold one value into the accumulator
    fn add(&self, value: &Self::Input, accumulator: &mut Self::Accumulator);

    /// Merge two accumulators into one
    fn merge(
        &self,
        left: Self::Accumulator,
        right: Self::Accumulator,
    ) -> AggregationResult<Self::Accumulator>;

    /// Produce the output for a window, consuming its accumulator
    fn finalize(&self, window: &WindowInstance, accumulator: Self::Accumulator) -> Self::Output;
}
