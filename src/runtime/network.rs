//! 间隔驱动器：在每个间隔内完成汇总收集、中央决策、提示下发与节点触发。
//! Interval driver: runs summary collection, the central decision, hint
//! delivery and node triggering within each interval.

use super::{
    handle::NodeHandle,
    traits::{GrantSink, NodeEndpoint},
};
use crate::{
    central::{CentralCoordinator, Decision, SchedulingHint},
    config::Config,
    error::{Error, Result},
    identity::{Imsi, SfnSf},
    sched::NodeScheduler,
};
use dashmap::DashMap;
use std::{collections::BTreeSet, sync::Arc};
use tokio::{
    sync::oneshot,
    task::JoinSet,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// Shared registry of the nodes driven by a runtime.
/// 运行时所驱动节点的共享注册表。
pub type NodeRegistry = Arc<DashMap<Imsi, Arc<dyn NodeEndpoint>>>;

/// What happened during one interval.
/// 一个间隔内发生的事情。
#[derive(Debug, Clone)]
pub struct IntervalReport {
    pub sfn: SfnSf,
    pub decision: Decision,
    /// Nodes that missed the summary or hint deadline and got no preference.
    /// 错过汇总或提示截止时间、因而没有偏好的节点。
    pub late_nodes: Vec<Imsi>,
    /// Nodes whose pass failed, with the error.
    /// 调度失败的节点及其错误。
    pub failed_nodes: Vec<(Imsi, Error)>,
    /// Number of allocations forwarded to the sink.
    /// 转发给接收端的分配数量。
    pub delivered: usize,
}

/// Drives every registered node through the per-interval exchange.
///
/// 驱动所有已注册节点完成每个间隔的交互流程。
pub struct NetworkRuntime {
    config: Config,
    nodes: NodeRegistry,
    coordinator: CentralCoordinator,
    sink: Arc<dyn GrantSink>,
    sfn: SfnSf,
}

impl NetworkRuntime {
    pub fn new(config: Config, sink: Arc<dyn GrantSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            coordinator: CentralCoordinator::new(config.coordinator.clone()),
            config,
            nodes: Arc::new(DashMap::new()),
            sink,
            sfn: SfnSf::new(0, 0),
        })
    }

    /// Registers an endpoint. The donor has no parent, every relay has one.
    ///
    /// 注册一个端点。宿主没有父节点，每个中继都有父节点。
    pub fn attach_endpoint(
        &mut self,
        endpoint: Arc<dyn NodeEndpoint>,
        parent: Option<Imsi>,
    ) -> Result<()> {
        let node = endpoint.node();
        if self.nodes.contains_key(&node) {
            return Err(Error::DuplicateNode(node));
        }
        match parent {
            Some(parent) => {
                self.coordinator.register_relay(node, parent)?;
            }
            None if node.is_donor() => {}
            None => return Err(Error::InvalidConfig("relay attached without a parent")),
        }
        self.nodes.insert(node, endpoint);
        info!(%node, parent = ?parent, "Node attached");
        Ok(())
    }

    /// Spawns an in-process node actor and registers it.
    ///
    /// 启动一个进程内节点actor并注册。
    pub fn spawn_node(&mut self, node: Imsi, parent: Option<Imsi>) -> Result<NodeHandle> {
        let scheduler = NodeScheduler::new(node, self.config.clone())?;
        let handle = NodeHandle::spawn(scheduler, self.config.runtime.command_channel_capacity);
        self.attach_endpoint(Arc::new(handle.clone()), parent)?;
        Ok(handle)
    }

    pub fn endpoint(&self, node: Imsi) -> Result<Arc<dyn NodeEndpoint>> {
        self.nodes
            .get(&node)
            .map(|e| e.value().clone())
            .ok_or(Error::UnknownNode(node))
    }

    pub fn coordinator(&self) -> &CentralCoordinator {
        &self.coordinator
    }

    /// Interval the next call to `run_interval` schedules.
    /// 下一次 `run_interval` 调度的间隔。
    pub fn next_sfn(&self) -> SfnSf {
        self.sfn
    }

    fn endpoints(&self) -> Vec<Arc<dyn NodeEndpoint>> {
        let mut endpoints: Vec<_> = self.nodes.iter().map(|e| e.value().clone()).collect();
        endpoints.sort_by_key(|e| e.node());
        endpoints
    }

    /// Collects summaries within the exchange deadline. Returns the nodes that missed it.
    /// 在交互截止时间内收集汇总，返回错过截止时间的节点。
    async fn collect(&mut self, endpoints: &[Arc<dyn NodeEndpoint>]) -> BTreeSet<Imsi> {
        let mut late: BTreeSet<Imsi> = endpoints.iter().map(|e| e.node()).collect();
        let deadline = Instant::now() + self.config.runtime.exchange_deadline;
        let mut requests = JoinSet::new();
        for endpoint in endpoints {
            let endpoint = endpoint.clone();
            requests.spawn(async move {
                let node = endpoint.node();
                (node, tokio::time::timeout_at(deadline, endpoint.collect_summary()).await)
            });
        }
        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok((node, Ok(Ok(summary)))) => {
                    late.remove(&node);
                    self.coordinator.ingest(summary);
                }
                Ok((node, Ok(Err(err)))) => {
                    warn!(%node, error = %err, "Summary collection failed");
                }
                Ok((node, Err(_))) => {
                    warn!(%node, "Summary missed the exchange deadline");
                }
                Err(err) => {
                    error!(error = %err, "Summary task failed");
                }
            }
        }
        late
    }

    /// Delivers every node's hint within the exchange deadline. Nodes already
    /// late get no preference. Nodes whose delivery misses the deadline are
    /// added to the late set; a node's hint resets after each pass, so they
    /// schedule without preference.
    ///
    /// 在交互截止时间内向每个节点下发提示。已迟到的节点没有偏好；下发超时的节点
    /// 也加入迟到集合。节点的提示在每次调度后重置，因此它们本间隔没有偏好。
    async fn deliver_hints(
        &self,
        endpoints: &[Arc<dyn NodeEndpoint>],
        decision: &Decision,
        mut late: BTreeSet<Imsi>,
    ) -> BTreeSet<Imsi> {
        let deadline = Instant::now() + self.config.runtime.exchange_deadline;
        let mut deliveries = JoinSet::new();
        for endpoint in endpoints {
            let node = endpoint.node();
            let hint = if late.contains(&node) {
                SchedulingHint::no_preference()
            } else {
                decision.hint_for(node)
            };
            let endpoint = endpoint.clone();
            deliveries.spawn(async move {
                (node, tokio::time::timeout_at(deadline, endpoint.deliver_hint(hint)).await)
            });
        }
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(Ok(())))) => {}
                Ok((node, Ok(Err(err)))) => {
                    warn!(%node, error = %err, "Hint delivery failed");
                }
                Ok((node, Err(_))) => {
                    warn!(%node, "Hint missed the exchange deadline, no preference this interval");
                    late.insert(node);
                }
                Err(err) => {
                    error!(error = %err, "Hint task failed");
                }
            }
        }
        late
    }

    /// Runs one complete interval across every registered node.
    ///
    /// 在所有已注册节点上运行一个完整的间隔。
    pub async fn run_interval(&mut self) -> IntervalReport {
        let sfn = self.sfn;
        self.sfn = sfn.next(self.config.frame.subframes_per_frame);
        let endpoints = self.endpoints();

        // 1. 收集汇总
        let late = if self.coordinator.collection_due() {
            self.collect(&endpoints).await
        } else {
            BTreeSet::new()
        };

        // 2. 中央决策
        let decision = self.coordinator.decide();

        // 3. 下发提示，迟到的节点本间隔没有偏好
        let late = self.deliver_hints(&endpoints, &decision, late).await;

        // 4. 触发所有节点
        let mut passes = JoinSet::new();
        for endpoint in &endpoints {
            let endpoint = endpoint.clone();
            passes.spawn(async move { (endpoint.node(), endpoint.trigger(sfn).await) });
        }
        let mut results = Vec::with_capacity(endpoints.len());
        while let Some(joined) = passes.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(%sfn, error = %err, "Scheduling task failed"),
            }
        }
        results.sort_by_key(|(node, _)| *node);

        let mut failed_nodes = Vec::new();
        let mut delivered = 0;
        for (node, result) in results {
            match result {
                Ok(allocation) => {
                    self.sink.deliver(node, allocation).await;
                    delivered += 1;
                }
                Err(err) => {
                    error!(%node, %sfn, error = %err, "Scheduling pass failed");
                    failed_nodes.push((node, err));
                }
            }
        }

        debug!(%sfn, delivered, late = late.len(), failed = failed_nodes.len(), "Interval complete");
        IntervalReport {
            sfn,
            decision,
            late_nodes: late.into_iter().collect(),
            failed_nodes,
            delivered,
        }
    }

    /// Runs intervals at the configured period until `shutdown_rx` fires or its sender is dropped.
    ///
    /// 按配置的周期运行间隔，直到 `shutdown_rx` 触发或其发送端被丢弃。
    pub async fn run(&mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.runtime.interval_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period = ?self.config.runtime.interval_period, "Interval driver started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!(next_sfn = %self.sfn, "Interval driver shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_interval().await;
                }
            }
        }
    }
}
