//! 节点汇总：每个节点上报给中央协调器的缓冲与容量快照。
//! Node summaries: the buffer and capacity snapshot each node reports upward.

use crate::{central::topology::NodeKey, identity::Imsi};
use std::collections::BTreeMap;

/// Per-target aggregates of one node for one collection round.
///
/// Terminal connections are folded into `NodeKey::Terminals { serving: node }`,
/// so the size of a summary grows with relays, not with terminals.
///
/// 某节点一轮收集的按目标聚合值。终端连接被折叠进 `NodeKey::Terminals { serving: node }`，
/// 因此汇总大小随中继数而非终端数增长。
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    /// Reporting node.
    /// 上报节点。
    pub node: Imsi,
    /// Buffered bytes toward and from each target.
    /// 与每个目标之间的缓冲字节数。
    pub buffers: BTreeMap<NodeKey, f64>,
    /// Estimated bytes per interval deliverable to each target.
    /// 每个间隔可传给每个目标的估计字节数。
    pub capacities: BTreeMap<NodeKey, f64>,
}

impl NodeSummary {
    pub fn new(node: Imsi) -> Self {
        Self {
            node,
            buffers: BTreeMap::new(),
            capacities: BTreeMap::new(),
        }
    }

    /// Targets mentioned by the summary.
    /// 汇总中涉及的目标。
    pub fn targets(&self) -> impl Iterator<Item = NodeKey> + '_ {
        let mut keys: Vec<_> = self
            .buffers
            .keys()
            .chain(self.capacities.keys())
            .copied()
            .collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
    }

    pub fn has_terminals(&self) -> bool {
        self.targets()
            .any(|k| matches!(k, NodeKey::Terminals { .. }))
    }
}
