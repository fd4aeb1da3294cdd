//! Various utilities shared by the Applause crates

pub mod counter;
pub mod pool;
pub mod timespec;

pub use pool::{Pool, PoolError, PoolHandle};
pub use timespec::Timespec64;

pub type AnyResult<T = (), E = anyhow::Error> = anyhow::Result<T, E>;
