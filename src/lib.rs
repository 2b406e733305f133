#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the multi-hop TDMA scheduler library.
//! 多跳TDMA调度器库的根。

pub mod amc;
pub mod config;
pub mod error;
pub mod identity;

pub mod central;
pub mod runtime;
pub mod sched;
pub mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use runtime::{NetworkRuntime, NodeHandle};
pub use sched::NodeScheduler;
