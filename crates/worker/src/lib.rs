//! Worker side of the job lifecycle: consume queue entries, run the
//! classifier, and report results back to the front door.

pub mod config;
pub mod delivery;
pub mod executor;
pub mod heartbeat;
pub mod pool;

pub use delivery::{FrontDoor, ResultCallbackClient};
pub use executor::TaskExecutor;
pub use pool::WorkerPool;
