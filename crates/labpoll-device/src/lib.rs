//! 设备注册、采集与落库编排

pub mod db;
pub mod error;
pub mod event;
pub mod instrument;
pub mod manager;
pub mod poller;
pub mod registry;
pub mod source;
pub mod state;

pub use error::{DeviceError, Result};
pub use event::{PollerEvent, RecordSummary};
pub use instrument::{Decoded, ExampleInstrument, Instrument, SmartPro};
pub use manager::{DeviceManager, DevicePoller, PollerSummary};
pub use poller::{Poller, PollerSettings, PollerSnapshot};
pub use registry::DeviceRegistry;
pub use source::{build_client, FetchError, HttpSource, MeasurementSource};
pub use state::{PollState, PollerStatus, RetryPolicy, Step};
