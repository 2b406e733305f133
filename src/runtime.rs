//! The async runtime: node actors, their commands and handles, and the interval driver.
mod actor;
pub mod command;
pub mod handle;
pub mod network;
pub mod traits;

pub use command::NodeCommand;
pub use handle::NodeHandle;
pub use network::{IntervalReport, NetworkRuntime, NodeRegistry};
pub use traits::{ChannelGrantSink, GrantSink, NodeEndpoint};
