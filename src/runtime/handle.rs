//! The user-facing handle of a node actor.

use super::{actor::NodeActor, command::NodeCommand, traits::NodeEndpoint};
use crate::{
    central::{NodeSummary, SchedulingHint},
    error::{Error, Result},
    identity::{ConnectionInfo, Imsi, Rnti, SfnSf},
    sched::{
        BusyNotification, DlBufferReport, HarqFeedback, NodeScheduler, QualityReport,
        SubframeAllocation, UlBufferReport,
    },
};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// A handle to a spawned `NodeActor`.
///
/// 已启动的 `NodeActor` 的句柄。
#[derive(Debug, Clone)]
pub struct NodeHandle {
    node: Imsi,
    command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    /// Spawns an actor owning `scheduler` and returns its handle.
    ///
    /// 启动一个拥有 `scheduler` 的actor并返回其句柄。
    pub fn spawn(scheduler: NodeScheduler, channel_capacity: usize) -> Self {
        let node = scheduler.node();
        let (command_tx, command_rx) = mpsc::channel(channel_capacity);
        tokio::spawn(NodeActor::new(scheduler, command_rx).run());
        Self { node, command_tx }
    }

    async fn send(&self, command: NodeCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    pub async fn configure_connection(&self, info: ConnectionInfo) -> Result<()> {
        self.send(NodeCommand::ConfigureConnection(info)).await
    }

    pub async fn release_connection(&self, rnti: Rnti) -> Result<()> {
        self.send(NodeCommand::ReleaseConnection(rnti)).await
    }

    pub async fn release_logical_channel(&self, rnti: Rnti, lcid: u8) -> Result<()> {
        self.send(NodeCommand::ReleaseLogicalChannel { rnti, lcid })
            .await
    }

    pub async fn dl_buffer_report(&self, report: DlBufferReport) -> Result<()> {
        self.send(NodeCommand::DlBuffer(report)).await
    }

    pub async fn ul_buffer_report(&self, report: UlBufferReport) -> Result<()> {
        self.send(NodeCommand::UlBuffer(report)).await
    }

    pub async fn quality_report(&self, report: QualityReport) -> Result<()> {
        self.send(NodeCommand::Quality(report)).await
    }

    pub async fn harq_feedback(&self, feedback: HarqFeedback) -> Result<()> {
        self.send(NodeCommand::Feedback(feedback)).await
    }

    pub async fn busy_notification(&self, notification: BusyNotification) -> Result<()> {
        self.send(NodeCommand::Busy(notification)).await
    }
}

#[async_trait]
impl NodeEndpoint for NodeHandle {
    fn node(&self) -> Imsi {
        self.node
    }

    async fn collect_summary(&self) -> Result<NodeSummary> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(NodeCommand::CollectSummary { response_tx })
            .await?;
        response_rx.await.map_err(|_| Error::ChannelClosed)
    }

    async fn deliver_hint(&self, hint: SchedulingHint) -> Result<()> {
        self.send(NodeCommand::Hint(hint)).await
    }

    async fn trigger(&self, sfn: SfnSf) -> Result<SubframeAllocation> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(NodeCommand::Trigger { sfn, response_tx })
            .await?;
        response_rx.await.map_err(|_| Error::ChannelClosed)?
    }
}
