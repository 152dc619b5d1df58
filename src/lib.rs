pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod slicer;
pub mod store;
pub mod wal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{EngineError, ReservationEngine};
pub use store::{Store, StoreError};
