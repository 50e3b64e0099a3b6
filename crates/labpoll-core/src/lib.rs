pub mod buffer;
pub mod bus;
pub mod error;

pub use buffer::{AddOutcome, MeasurementBuffer, DEFAULT_CAPACITY};
pub use bus::{EventBus, SharedEventBus};
pub use error::{CoreError, Result};
