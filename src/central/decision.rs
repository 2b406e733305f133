//! 中央协调决策与下发给各节点的调度提示。
//! Coordination decisions and the scheduling hints delivered to each node.

use crate::{
    central::topology::{Edge, NodeKey},
    identity::Imsi,
};
use std::collections::BTreeMap;

/// Which flows a node should serve first.
/// 节点应优先服务的流。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HintTarget {
    #[default]
    NoPreference,
    /// The connection toward this relay.
    /// 通往该中继的连接。
    Node(Imsi),
    /// Every terminal connection of the node.
    /// 该节点的所有终端连接。
    Terminals,
}

impl HintTarget {
    /// Hint a parent receives for one of its active edges.
    /// 父节点因其某条活跃边而收到的提示。
    pub fn for_child(child: NodeKey) -> Self {
        match child {
            NodeKey::Node(imsi) => HintTarget::Node(imsi),
            NodeKey::Terminals { .. } => HintTarget::Terminals,
        }
    }
}

/// One-interval scheduling preference for a node.
/// 某节点一个间隔内的调度偏好。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulingHint {
    pub target: HintTarget,
}

impl SchedulingHint {
    pub fn new(target: HintTarget) -> Self {
        Self { target }
    }

    pub fn no_preference() -> Self {
        Self::default()
    }
}

/// Outcome of one coordination round.
/// 一轮协调的结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// Edges selected by the matching this round.
    /// 本轮匹配选中的边。
    pub active_edges: Vec<Edge>,
    /// Hints taking effect this interval, keyed by the node receiving them.
    /// 本间隔生效的提示，以接收节点为键。
    pub hints: BTreeMap<Imsi, HintTarget>,
}

impl Decision {
    /// Hint for a node, no preference when the node got none.
    /// 某节点的提示，未收到时为无偏好。
    pub fn hint_for(&self, node: Imsi) -> SchedulingHint {
        SchedulingHint::new(self.hints.get(&node).copied().unwrap_or_default())
    }
}
