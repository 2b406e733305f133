//! 节点调度器：拥有一个节点的全部调度状态，并驱动每个间隔的分配。
//! Node scheduler: owns all scheduling state of one node and drives the
//! per-interval allocation.
//!
//! 职责：
//! - 接收缓冲区、信道质量、HARQ反馈和忙碌符号报告
//! - 按中央协调器的提示将连接划分为优先组和剩余组
//! - 生成上报给中央协调器的节点汇总

use crate::{
    amc::{AmcTable, TransportBlockModel},
    central::{
        decision::{HintTarget, SchedulingHint},
        summary::NodeSummary,
        topology::NodeKey,
    },
    config::Config,
    error::Result,
    identity::{ConnectionDirectory, ConnectionInfo, Direction, Imsi, ImsiResolver, Rnti, SfnSf},
    sched::{
        allocator::{Allocator, SymbolGrid},
        busy::{BusyNotification, BusyResourceCoordinator},
        demand::{DemandTracker, DlBufferReport, UlBufferReport},
        grant::SubframeAllocation,
        harq::{FeedbackOutcome, HarqFeedback, HarqManager},
        link_quality::{LinkQualityTracker, QualityReport},
    },
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The per-node scheduler.
/// 单节点调度器。
#[derive(Debug)]
pub struct NodeScheduler {
    node: Imsi,
    config: Config,
    model: Arc<dyn TransportBlockModel>,
    directory: ConnectionDirectory,
    link_quality: LinkQualityTracker,
    demand: DemandTracker,
    harq: HarqManager,
    busy: BusyResourceCoordinator,
    /// Hint for the next interval, reset after use.
    /// 下一个间隔的提示，使用后重置。
    hint: SchedulingHint,
    /// Connection served first next interval.
    /// 下一个间隔最先服务的连接。
    next_start: Option<Rnti>,
}

impl NodeScheduler {
    /// Creates a scheduler for `node` using the table-driven transport-block model.
    /// 使用查表传输块模型为 `node` 创建调度器。
    pub fn new(node: Imsi, config: Config) -> Result<Self> {
        let model = Arc::new(AmcTable::from_frame(&config.frame));
        Self::with_model(node, config, model)
    }

    /// Creates a scheduler with a custom transport-block model.
    /// 使用自定义传输块模型创建调度器。
    pub fn with_model(
        node: Imsi,
        config: Config,
        model: Arc<dyn TransportBlockModel>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            node,
            link_quality: LinkQualityTracker::new(&config.link_quality),
            harq: HarqManager::new(&config.harq),
            busy: BusyResourceCoordinator::new(
                config.frame.symbols_per_subframe,
                config.frame.subframes_per_frame,
            ),
            config,
            model,
            directory: ConnectionDirectory::new(),
            demand: DemandTracker::new(),
            hint: SchedulingHint::no_preference(),
            next_start: None,
        })
    }

    pub fn node(&self) -> Imsi {
        self.node
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn demand(&self) -> &DemandTracker {
        &self.demand
    }

    pub fn harq(&self) -> &HarqManager {
        &self.harq
    }

    pub fn link_quality(&self) -> &LinkQualityTracker {
        &self.link_quality
    }

    /// Sets up a connection and its HARQ processes.
    /// 建立连接及其HARQ进程。
    pub fn configure_connection(&mut self, info: ConnectionInfo) {
        info!(node = %self.node, rnti = %info.rnti, imsi = %info.imsi, relay = info.relay, "Connection configured");
        self.directory.insert(info);
        self.harq.add_connection(info.rnti);
        self.link_quality.on_connection_configured(info.rnti);
    }

    /// Tears down a connection. Pending feedback and demand are discarded.
    /// 拆除连接，丢弃待处理的反馈和需求。
    pub fn release_connection(&mut self, rnti: Rnti) {
        if self.directory.remove(rnti).is_none() {
            warn!(node = %self.node, %rnti, "Release of unknown connection ignored");
            return;
        }
        self.harq.remove_connection(rnti);
        self.demand.remove(rnti);
        self.link_quality.remove(rnti);
        if self.next_start == Some(rnti) {
            self.next_start = None;
        }
        info!(node = %self.node, %rnti, "Connection released");
    }

    /// Drops the downlink demand of one logical channel.
    /// 删除一个逻辑信道的下行需求。
    pub fn release_logical_channel(&mut self, rnti: Rnti, lcid: u8) {
        self.demand.release_channel(rnti, lcid);
        debug!(node = %self.node, %rnti, lcid, "Logical channel released");
    }

    pub fn on_dl_buffer_report(&mut self, report: DlBufferReport) {
        if !self.directory.contains(report.rnti) {
            warn!(node = %self.node, rnti = %report.rnti, "Downlink report for unknown connection ignored");
            return;
        }
        self.demand.merge_downlink_report(
            report.rnti,
            report.lcid,
            report.new_bytes,
            report.retx_bytes,
            report.status_bytes,
        );
    }

    pub fn on_ul_buffer_report(&mut self, report: UlBufferReport) {
        if !self.directory.contains(report.rnti) {
            warn!(node = %self.node, rnti = %report.rnti, "Uplink report for unknown connection ignored");
            return;
        }
        self.demand
            .merge_uplink_report(report.rnti, report.buffered_bytes, report.status_bytes);
    }

    pub fn on_quality_report(&mut self, report: QualityReport) {
        if !self.directory.contains(report.rnti) {
            warn!(node = %self.node, rnti = %report.rnti, "Quality report for unknown connection ignored");
            return;
        }
        self.link_quality
            .record(report.rnti, report.direction, report.indicator);
    }

    /// Applies HARQ feedback. Feedback for an unconfigured connection is an error.
    /// 应用HARQ反馈。对未配置连接的反馈属于错误。
    pub fn on_harq_feedback(&mut self, feedback: HarqFeedback) -> Result<FeedbackOutcome> {
        self.harq.on_feedback(feedback)
    }

    pub fn on_busy_notification(&mut self, notification: BusyNotification) -> Result<()> {
        self.busy
            .mark_busy(notification.sfn, notification.start, notification.len)
    }

    /// Sets the preference used by the next interval only.
    /// 设置仅用于下一个间隔的偏好。
    pub fn apply_hint(&mut self, hint: SchedulingHint) {
        self.hint = hint;
    }

    fn is_favored(&self, rnti: Rnti, target: HintTarget) -> bool {
        match target {
            HintTarget::NoPreference => false,
            HintTarget::Node(imsi) => self.directory.imsi_of(rnti) == Some(imsi),
            HintTarget::Terminals => !self.directory.is_relay(rnti),
        }
    }

    /// Connections in round-robin order for this interval.
    /// 本间隔按轮询排序的连接。
    fn rotation_order(&self) -> Vec<Rnti> {
        let mut order: Vec<Rnti> = self.directory.iter().map(|c| c.rnti).collect();
        if let Some(start) = self.next_start {
            let pos = order.iter().position(|r| *r >= start).unwrap_or(0);
            order.rotate_left(pos);
        }
        order
    }

    /// Bytes per interval a connection could carry over the whole subframe.
    /// 某连接在整个子帧上每间隔可承载的字节数。
    fn capacity_estimate(&self, rnti: Rnti, direction: Direction) -> f64 {
        self.link_quality
            .coding_scheme(rnti, direction)
            .map_or(0.0, |mcs| {
                f64::from(self.model.tb_size_bytes(mcs, 1))
                    * self.config.frame.symbols_per_subframe as f64
            })
    }

    /// Aggregated buffer and capacity per coordination target.
    ///
    /// Relays are reported individually, all terminals of this node as one bucket.
    ///
    /// 按协调目标聚合的缓冲和容量。中继单独上报，本节点的所有终端作为一个桶上报。
    pub fn summary(&self) -> NodeSummary {
        let mut summary = NodeSummary::new(self.node);
        let bucket = NodeKey::Terminals { serving: self.node };
        let mut terminal_capacities = Vec::new();

        for info in self.directory.iter() {
            let buffer = (self.demand.downlink_backlog(info.rnti)
                + self.demand.uplink_backlog(info.rnti)) as f64;
            let capacity = (self.capacity_estimate(info.rnti, Direction::Downlink)
                + self.capacity_estimate(info.rnti, Direction::Uplink))
                / 2.0;
            if info.relay {
                let key = NodeKey::Node(info.imsi);
                summary.buffers.insert(key, buffer);
                summary.capacities.insert(key, capacity);
            } else {
                *summary.buffers.entry(bucket).or_default() += buffer;
                terminal_capacities.push(capacity);
            }
        }
        if !terminal_capacities.is_empty() {
            let mean = terminal_capacities.iter().sum::<f64>() / terminal_capacities.len() as f64;
            summary.capacities.insert(bucket, mean);
        }
        summary
    }

    /// Runs one complete scheduling pass for `sfn`.
    ///
    /// Errors are configuration errors and abort the pass.
    ///
    /// 为 `sfn` 执行一次完整的调度。返回的错误均为配置错误，会中止本次调度。
    pub fn schedule(&mut self, sfn: SfnSf) -> Result<SubframeAllocation> {
        self.link_quality.decay();
        self.harq.tick();
        let busy = self.busy.consume_and_clear(sfn);
        let mut grid = SymbolGrid::new(sfn, &self.config.frame, &busy);

        let hint = std::mem::take(&mut self.hint);
        let order = self.rotation_order();
        let (favored, leftover): (Vec<Rnti>, Vec<Rnti>) = order
            .iter()
            .partition(|&&rnti| self.is_favored(rnti, hint.target));
        if !favored.is_empty() {
            debug!(node = %self.node, %sfn, target = ?hint.target, favored = favored.len(), "Serving favored connections first");
        }

        let mut allocator = Allocator::new(
            &self.config,
            self.model.as_ref(),
            &self.directory,
            &self.link_quality,
            &mut self.demand,
            &mut self.harq,
            grid.available(),
        );
        for partition in [&favored, &leftover] {
            if !partition.is_empty() {
                allocator.run_partition(&mut grid, partition)?;
            }
        }

        self.next_start = order.get(1).copied();
        let allocation = grid.finish();
        debug!(
            node = %self.node,
            %sfn,
            grants = allocation.grants.len(),
            symbols = allocation.symbols_used(),
            "Interval scheduled"
        );
        Ok(allocation)
    }
}
