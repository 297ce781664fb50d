//! bl-core: shared foundation for benchloop.
//!
//! Contains:
//! - numeric (`Limit` clamping + float helpers)
//! - ids (capture, run and channel identifiers)
//! - timing (iteration duration tracking and ETA estimation)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use timing::{LoopTimer, format_hms};
