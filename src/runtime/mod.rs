//! Runtime helpers shared by request handling and startup.

pub mod pool;

pub use pool::{BlockingPool, PoolError};
