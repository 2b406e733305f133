//! 中央多跳协调器
//! Central Multi-Hop Coordinator
//!
//! 职责：
//! - 维护以宿主为根的拓扑与每个节点最近一次上报的汇总
//! - 按分配周期计算边权重并在树上求最大权匹配
//! - 维护每条边的激活计数器
//! - 按跳数延迟将提示排队下发

use crate::{
    central::{
        decision::{Decision, HintTarget, SchedulingHint},
        matching::max_weight_matching,
        policy::{EdgeInputs, WeightPolicy, WeightPolicyFactory},
        summary::NodeSummary,
        topology::{Edge, NodeKey, Topology},
    },
    config::CoordinatorConfig,
    error::Result,
    identity::Imsi,
};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

/// Gateway-resident coordinator issuing one preference per parent each interval.
/// 驻留在网关的协调器，每个间隔为每个父节点给出一个偏好。
#[derive(Debug)]
pub struct CentralCoordinator {
    config: CoordinatorConfig,
    policy: Box<dyn WeightPolicy>,
    topology: Topology,
    summaries: BTreeMap<Imsi, NodeSummary>,
    /// Decisions since each edge was last active.
    /// 每条边自上次活跃以来的决策次数。
    counters: BTreeMap<Edge, u64>,
    /// Index of the next interval to decide for.
    /// 下一个待决策间隔的序号。
    interval: u64,
    last_active: Vec<Edge>,
    /// Hints waiting for their hop delay, keyed by the interval they take effect in.
    /// 等待跳数延迟的提示，以其生效的间隔为键。
    pending: BTreeMap<u64, BTreeMap<Imsi, HintTarget>>,
    current: Decision,
}

impl CentralCoordinator {
    /// Creates a coordinator using the configured weight policy.
    /// 使用配置的权重策略创建协调器。
    pub fn new(config: CoordinatorConfig) -> Self {
        let policy = WeightPolicyFactory::create(&config);
        Self::with_policy(config, policy)
    }

    /// Creates a coordinator with a custom weight policy.
    /// 使用自定义权重策略创建协调器。
    pub fn with_policy(config: CoordinatorConfig, policy: Box<dyn WeightPolicy>) -> Self {
        info!(policy = policy.name(), enabled = config.enabled, "Central coordinator created");
        Self {
            config,
            policy,
            topology: Topology::new(),
            summaries: BTreeMap::new(),
            counters: BTreeMap::new(),
            interval: 0,
            last_active: Vec::new(),
            pending: BTreeMap::new(),
            current: Decision::default(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Attaches a relay below its parent. Returns the relay's hop depth.
    /// 将中继挂接到其父节点下，返回其跳数深度。
    pub fn register_relay(&mut self, child: Imsi, parent: Imsi) -> Result<u32> {
        self.topology.register_relay(child, parent)
    }

    /// Whether summaries should be refreshed before the next decision.
    /// 下一次决策前是否应刷新汇总。
    pub fn collection_due(&self) -> bool {
        self.config.enabled && self.interval % u64::from(self.config.info_collection_period) == 0
    }

    /// Stores the latest summary of a node. Returns `false` for unknown nodes.
    /// 保存某节点的最新汇总，未知节点返回 `false`。
    pub fn ingest(&mut self, summary: NodeSummary) -> bool {
        let node = summary.node;
        if !self.topology.contains(NodeKey::Node(node)) {
            warn!(%node, "Summary from unknown node ignored");
            return false;
        }
        for target in summary.targets() {
            match target {
                NodeKey::Terminals { serving } if serving == node => {
                    // 拓扑中已确认存在该节点，不会失败
                    if let Ok(true) = self.topology.ensure_terminal_bucket(serving) {
                        debug!(%node, "Terminal bucket joined the topology");
                    }
                }
                NodeKey::Node(imsi) if self.topology.parent(target) == Some(node) => {
                    trace!(%node, child = %imsi, "Relay summary entry");
                }
                _ => {
                    debug!(%node, %target, "Summary entry for a target not below this node ignored");
                }
            }
        }
        self.summaries.insert(node, summary);
        true
    }

    /// Decisions since `edge` was last active, 0 for an edge never evaluated.
    /// 自 `edge` 上次活跃以来的决策次数，从未参与评估的边为0。
    pub fn edge_counter(&self, edge: Edge) -> u64 {
        self.counters.get(&edge).copied().unwrap_or(0)
    }

    fn edge_inputs(&self, edge: Edge) -> EdgeInputs {
        let summary = self.summaries.get(&edge.parent);
        EdgeInputs {
            edge,
            buffer: summary.and_then(|s| s.buffers.get(&edge.child).copied()),
            capacity: summary.and_then(|s| s.capacities.get(&edge.child).copied()),
            inactive_for: self.edge_counter(edge),
        }
    }

    fn run_matching(&mut self) -> Vec<Edge> {
        let edges = self.topology.edges();
        let weights: BTreeMap<Edge, f64> = edges
            .iter()
            .map(|&edge| (edge, self.policy.weight(&self.edge_inputs(edge))))
            .collect();
        let active = max_weight_matching(&self.topology, &weights);

        for edge in edges {
            let counter = self.counters.entry(edge).or_insert(0);
            *counter = if active.contains(&edge) { 0 } else { *counter + 1 };
        }
        debug!(
            interval = self.interval,
            policy = self.policy.name(),
            candidates = weights.len(),
            active = active.len(),
            "Matching computed"
        );
        active
    }

    /// Computes the decision for the next interval.
    ///
    /// A fresh matching runs every `allocation_period` intervals. In between the
    /// previous active edges are re-used. Hints for a parent at depth `d` take
    /// effect `d * hop_delay` intervals later.
    ///
    /// 计算下一个间隔的决策。每 `allocation_period` 个间隔重新计算一次匹配，其间沿用上次的
    /// 活跃边。深度为 `d` 的父节点的提示在 `d * hop_delay` 个间隔后生效。
    pub fn decide(&mut self) -> Decision {
        let interval = self.interval;
        self.interval += 1;
        if !self.config.enabled {
            self.current = Decision::default();
            return self.current.clone();
        }

        let active = if interval % u64::from(self.config.allocation_period) == 0 {
            let active = self.run_matching();
            self.last_active = active.clone();
            active
        } else {
            self.last_active.clone()
        };

        for edge in &active {
            let depth = self
                .topology
                .depth(NodeKey::Node(edge.parent))
                .unwrap_or(0);
            let due = interval + u64::from(depth) * u64::from(self.config.hop_delay);
            self.pending
                .entry(due)
                .or_default()
                .insert(edge.parent, HintTarget::for_child(edge.child));
        }
        // 早于当前间隔的提示已失效
        self.pending = self.pending.split_off(&interval);
        let hints = self.pending.remove(&interval).unwrap_or_default();
        for (node, target) in &hints {
            trace!(%node, ?target, interval, "Hint issued");
        }

        self.current = Decision {
            active_edges: active,
            hints,
        };
        self.current.clone()
    }

    /// Hint of a node for the interval last decided.
    /// 某节点在最近一次决策的间隔中的提示。
    pub fn hint_for(&self, node: Imsi) -> SchedulingHint {
        self.current.hint_for(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyKind;

    fn create_test_coordinator(config: CoordinatorConfig, relays: &[u64]) -> CentralCoordinator {
        let mut coordinator = CentralCoordinator::new(config);
        for &relay in relays {
            coordinator.register_relay(Imsi(relay), Imsi::DONOR).unwrap();
        }
        coordinator
    }

    fn donor_summary(capacities: &[(u64, f64)]) -> NodeSummary {
        let mut summary = NodeSummary::new(Imsi::DONOR);
        for &(relay, capacity) in capacities {
            summary.capacities.insert(NodeKey::Node(Imsi(relay)), capacity);
            summary.buffers.insert(NodeKey::Node(Imsi(relay)), 100.0);
        }
        summary
    }

    fn relay_edge(relay: u64) -> Edge {
        Edge {
            parent: Imsi::DONOR,
            child: NodeKey::Node(Imsi(relay)),
        }
    }

    #[test]
    fn test_three_relays_without_terminals() {
        let mut coordinator = create_test_coordinator(CoordinatorConfig::default(), &[1, 2, 3]);
        // 无汇总时所有边权重均为最小容量，打平 -> 无偏好
        let decision = coordinator.decide();
        assert!(decision.active_edges.is_empty());
        assert_eq!(coordinator.hint_for(Imsi::DONOR).target, HintTarget::NoPreference);

        assert!(coordinator.ingest(donor_summary(&[(1, 300.0), (2, 900.0), (3, 600.0)])));
        let decision = coordinator.decide();
        assert_eq!(decision.active_edges, vec![relay_edge(2)]);
        assert_eq!(coordinator.hint_for(Imsi::DONOR).target, HintTarget::Node(Imsi(2)));
        // 未被匹配的中继没有提示
        assert_eq!(coordinator.hint_for(Imsi(1)).target, HintTarget::NoPreference);
    }

    #[test]
    fn test_edge_counters_reset_on_activation() {
        let mut coordinator = create_test_coordinator(CoordinatorConfig::default(), &[1, 2]);
        coordinator.ingest(donor_summary(&[(1, 500.0), (2, 200.0)]));
        coordinator.decide();
        assert_eq!(coordinator.edge_counter(relay_edge(1)), 0);
        assert_eq!(coordinator.edge_counter(relay_edge(2)), 1);
        coordinator.decide();
        assert_eq!(coordinator.edge_counter(relay_edge(1)), 0);
        assert_eq!(coordinator.edge_counter(relay_edge(2)), 2);
    }

    #[test]
    fn test_mrba_rotates_starved_edges_in() {
        let config = CoordinatorConfig {
            policy: PolicyKind::Mrba,
            mrba_eta: 1.0,
            mrba_mu_threshold: 1.0,
            ..Default::default()
        };
        let mut coordinator = create_test_coordinator(config, &[1, 2]);
        coordinator.ingest(donor_summary(&[(1, 500.0), (2, 450.0)]));
        let first = coordinator.decide();
        assert_eq!(first.active_edges, vec![relay_edge(1)]);
        // 边2等待一轮后：450 + 100 * 1 = 550 > 500
        let second = coordinator.decide();
        assert_eq!(second.active_edges, vec![relay_edge(2)]);
    }

    #[test]
    fn test_allocation_period_reuses_previous_decision() {
        let config = CoordinatorConfig {
            allocation_period: 3,
            ..Default::default()
        };
        let mut coordinator = create_test_coordinator(config, &[1, 2]);
        coordinator.ingest(donor_summary(&[(1, 500.0), (2, 200.0)]));
        let first = coordinator.decide();
        coordinator.ingest(donor_summary(&[(1, 100.0), (2, 800.0)]));
        assert_eq!(coordinator.decide().active_edges, first.active_edges);
        assert_eq!(coordinator.decide().active_edges, first.active_edges);
        // 第四个间隔重新计算
        assert_eq!(coordinator.decide().active_edges, vec![relay_edge(2)]);
        // 复用决策时计数器不前进
        assert_eq!(coordinator.edge_counter(relay_edge(1)), 1);
    }

    #[test]
    fn test_collection_follows_its_period() {
        let config = CoordinatorConfig {
            info_collection_period: 2,
            ..Default::default()
        };
        let mut coordinator = create_test_coordinator(config, &[]);
        assert!(coordinator.collection_due());
        coordinator.decide();
        assert!(!coordinator.collection_due());
        coordinator.decide();
        assert!(coordinator.collection_due());
    }

    #[test]
    fn test_hop_delay_holds_deeper_hints_back() {
        let config = CoordinatorConfig {
            hop_delay: 2,
            ..Default::default()
        };
        let mut coordinator = create_test_coordinator(config, &[1]);
        coordinator.register_relay(Imsi(5), Imsi(1)).unwrap();
        let mut summary = NodeSummary::new(Imsi(1));
        summary.capacities.insert(NodeKey::Node(Imsi(5)), 700.0);
        coordinator.ingest(summary);
        // 宿主 -> 1 的权重为最小容量 1.0，1 -> 5 的权重为 700
        let decision = coordinator.decide();
        assert_eq!(
            decision.active_edges,
            vec![Edge {
                parent: Imsi(1),
                child: NodeKey::Node(Imsi(5)),
            }]
        );
        // 深度1 * 跳数延迟2：第三个间隔才生效
        assert_eq!(coordinator.hint_for(Imsi(1)).target, HintTarget::NoPreference);
        coordinator.decide();
        assert_eq!(coordinator.hint_for(Imsi(1)).target, HintTarget::NoPreference);
        coordinator.decide();
        assert_eq!(coordinator.hint_for(Imsi(1)).target, HintTarget::Node(Imsi(5)));
    }

    #[test]
    fn test_ingest_grows_terminal_buckets() {
        let mut coordinator = create_test_coordinator(CoordinatorConfig::default(), &[1]);
        let mut summary = donor_summary(&[(1, 100.0)]);
        let bucket = NodeKey::Terminals {
            serving: Imsi::DONOR,
        };
        summary.capacities.insert(bucket, 400.0);
        assert!(coordinator.ingest(summary));
        assert!(coordinator.topology().contains(bucket));

        coordinator.decide();
        assert_eq!(coordinator.hint_for(Imsi::DONOR).target, HintTarget::Terminals);
    }

    #[test]
    fn test_unknown_reporter_is_ignored() {
        let mut coordinator = create_test_coordinator(CoordinatorConfig::default(), &[1]);
        assert!(!coordinator.ingest(NodeSummary::new(Imsi(99))));
    }

    #[test]
    fn test_disabled_coordinator_gives_no_preference() {
        let config = CoordinatorConfig {
            enabled: false,
            ..Default::default()
        };
        let mut coordinator = create_test_coordinator(config, &[1]);
        coordinator.ingest(donor_summary(&[(1, 100.0)]));
        assert_eq!(coordinator.decide(), Decision::default());
        assert!(!coordinator.collection_due());
    }
}
