//! Defines the pluggable edge-weight interface of the central coordinator.
//! 定义了中央协调器可插拔的边权重接口。

use crate::{
    central::topology::Edge,
    config::{CoordinatorConfig, PolicyKind},
};
use std::fmt::Debug;

/// Everything a policy may know about one edge this round.
/// 本轮策略可获知的某条边的全部信息。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeInputs {
    pub edge: Edge,
    /// Buffered bytes reported by the parent for the child, if reported.
    /// 父节点为该子节点上报的缓冲字节数（若有）。
    pub buffer: Option<f64>,
    /// Estimated bytes per interval over the edge, if reported.
    /// 该边每间隔可传输的估计字节数（若有）。
    pub capacity: Option<f64>,
    /// Decisions since the edge was last active.
    /// 自该边上次活跃以来的决策次数。
    pub inactive_for: u64,
}

/// A trait for edge-weight rules.
///
/// Edges with a weight of zero or less are never matched.
///
/// 边权重规则的 trait。权重不大于零的边永远不会被匹配。
pub trait WeightPolicy: Debug + Send + Sync {
    /// Short name used in logs.
    /// 日志中使用的简短名称。
    fn name(&self) -> &'static str;

    /// Weight of one edge.
    /// 某条边的权重。
    fn weight(&self, inputs: &EdgeInputs) -> f64;
}

/// Favors the links able to carry the most bytes.
/// 优先选择可承载字节数最多的链路。
#[derive(Debug, Clone, Copy)]
pub struct MaxSumCapacity {
    pub min_capacity: f64,
}

impl WeightPolicy for MaxSumCapacity {
    fn name(&self) -> &'static str {
        "max-sum-capacity"
    }

    fn weight(&self, inputs: &EdgeInputs) -> f64 {
        inputs.capacity.unwrap_or(self.min_capacity)
    }
}

/// Favors the links with the largest backlog.
/// 优先选择积压最多的链路。
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxBuffer;

impl WeightPolicy for MinMaxBuffer {
    fn name(&self) -> &'static str {
        "min-max-buffer"
    }

    fn weight(&self, inputs: &EdgeInputs) -> f64 {
        inputs.buffer.unwrap_or(0.0)
    }
}

/// Capacity plus a buffer term that grows with the time an edge went unserved.
///
/// `weight = cap + eta * buf * (inactive_for / mu) ^ k`
///
/// 容量加上随边未被服务时间增长的缓冲项。
#[derive(Debug, Clone, Copy)]
pub struct Mrba {
    pub min_capacity: f64,
    pub eta: f64,
    pub mu_threshold: f64,
    pub exponent: f64,
}

impl WeightPolicy for Mrba {
    fn name(&self) -> &'static str {
        "mrba"
    }

    fn weight(&self, inputs: &EdgeInputs) -> f64 {
        let capacity = inputs.capacity.unwrap_or(self.min_capacity);
        let buffer = inputs.buffer.unwrap_or(0.0);
        let age = (inputs.inactive_for as f64 / self.mu_threshold).powf(self.exponent);
        capacity + self.eta * buffer * age
    }
}

/// Builds the policy selected by the configuration.
/// 根据配置构造所选策略。
pub struct WeightPolicyFactory;

impl WeightPolicyFactory {
    pub fn create(config: &CoordinatorConfig) -> Box<dyn WeightPolicy> {
        match config.policy {
            PolicyKind::MaxSumCapacity => Box::new(MaxSumCapacity {
                min_capacity: config.min_capacity,
            }),
            PolicyKind::MinMaxBuffer => Box::new(MinMaxBuffer),
            PolicyKind::Mrba => Box::new(Mrba {
                min_capacity: config.min_capacity,
                eta: config.mrba_eta,
                mu_threshold: config.mrba_mu_threshold,
                exponent: config.mrba_exponent,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{central::topology::NodeKey, identity::Imsi};

    fn create_test_inputs(buffer: Option<f64>, capacity: Option<f64>, inactive_for: u64) -> EdgeInputs {
        EdgeInputs {
            edge: Edge {
                parent: Imsi::DONOR,
                child: NodeKey::Node(Imsi(1)),
            },
            buffer,
            capacity,
            inactive_for,
        }
    }

    #[test]
    fn test_capacity_policy_falls_back_to_minimum() {
        let policy = MaxSumCapacity { min_capacity: 1.0 };
        assert_eq!(policy.weight(&create_test_inputs(None, Some(800.0), 0)), 800.0);
        assert_eq!(policy.weight(&create_test_inputs(Some(5.0), None, 0)), 1.0);
    }

    #[test]
    fn test_buffer_policy_ignores_capacity() {
        let policy = MinMaxBuffer;
        assert_eq!(policy.weight(&create_test_inputs(Some(300.0), Some(9.0), 0)), 300.0);
        assert_eq!(policy.weight(&create_test_inputs(None, Some(9.0), 0)), 0.0);
    }

    #[test]
    fn test_mrba_grows_with_inactivity() {
        let policy = Mrba {
            min_capacity: 1.0,
            eta: 1.0,
            mu_threshold: 10.0,
            exponent: 1.0,
        };
        // 刚被服务过的边只剩容量项
        assert_eq!(policy.weight(&create_test_inputs(Some(100.0), Some(50.0), 0)), 50.0);
        // 50 + 1.0 * 100 * (20/10)^1 = 250
        assert_eq!(policy.weight(&create_test_inputs(Some(100.0), Some(50.0), 20)), 250.0);
    }

    #[test]
    fn test_factory_follows_config() {
        let mut config = CoordinatorConfig::default();
        assert_eq!(WeightPolicyFactory::create(&config).name(), "max-sum-capacity");
        config.policy = PolicyKind::MinMaxBuffer;
        assert_eq!(WeightPolicyFactory::create(&config).name(), "min-max-buffer");
        config.policy = PolicyKind::Mrba;
        assert_eq!(WeightPolicyFactory::create(&config).name(), "mrba");
    }
}
