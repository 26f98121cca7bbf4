//! Cancellation and timeout coordination.
//!
//! Every externally observable step of an exchange is raced against a timer and an
//! external [`CancellationToken`](tokio_util::sync::CancellationToken):
//!
//! - [`race_until`]: the three-way race for a single step
//! - [`ExchangeCoordinator`]: the deadline and token of one exchange, shared by all its steps
//! - [`CancellationIndicator`]: set-once flag deciding which of several racing completions acts

mod coordinator;
mod indicator;

pub use coordinator::{ExchangeCoordinator, race_until};
pub use indicator::CancellationIndicator;
