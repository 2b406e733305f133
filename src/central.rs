//! 中央多跳协调：拓扑、节点汇总、边权重策略、树上最大权匹配与提示。
//! Central multi-hop coordination: topology, node summaries, weight policies,
//! tree matching and hints.

pub mod coordinator;
pub mod decision;
pub mod matching;
pub mod policy;
pub mod summary;
pub mod topology;

pub use coordinator::CentralCoordinator;
pub use decision::{Decision, HintTarget, SchedulingHint};
pub use policy::{EdgeInputs, WeightPolicy, WeightPolicyFactory};
pub use summary::NodeSummary;
pub use topology::{Edge, NodeKey, Topology};
