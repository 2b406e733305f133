//! 单节点调度：质量跟踪、需求跟踪、HARQ、忙碌符号协调与符号网格分配。
//! Per-node scheduling: link quality, demand, HARQ, busy-symbol coordination
//! and symbol-grid allocation.

pub mod allocator;
pub mod busy;
pub mod demand;
pub mod fairness;
pub mod grant;
pub mod harq;
pub mod link_quality;
pub mod scheduler;


pub use busy::BusyNotification;
pub use demand::{DlBufferReport, UlBufferReport};
pub use grant::{Grant, GrantKind, PayloadSlice, SubframeAllocation};
pub use harq::{Feedback, FeedbackOutcome, HarqFeedback};
pub use link_quality::{Indicator, QualityReport};
pub use scheduler::NodeScheduler;
