//! Wake signal implementations. Which one is active is decided by
//! [`WakeStrategy`](crate::config::WakeStrategy) when the storage is built.

mod local;
mod tailing;

pub use local::LocalWakeSignal;
pub use tailing::TailingWakeSignal;
