//! Traits for abstracting over nodes and grant consumers.
use crate::{
    central::{NodeSummary, SchedulingHint},
    error::Result,
    identity::{Imsi, SfnSf},
    sched::SubframeAllocation,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// One scheduling node as seen by the interval driver.
///
/// This trait allows the driver to work with in-process actors as well as
/// remote or simulated nodes.
///
/// 间隔驱动器所见的一个调度节点。
///
/// 此trait使驱动器既可使用进程内actor，也可使用远程或模拟节点。
#[async_trait]
pub trait NodeEndpoint: Send + Sync + 'static {
    /// Network-wide identity of the node.
    fn node(&self) -> Imsi;

    /// Reports the node's current buffer and capacity summary.
    async fn collect_summary(&self) -> Result<NodeSummary>;

    /// Delivers the preference for the coming interval.
    async fn deliver_hint(&self, hint: SchedulingHint) -> Result<()>;

    /// Runs the node's scheduling pass for `sfn`.
    async fn trigger(&self, sfn: SfnSf) -> Result<SubframeAllocation>;
}

/// Consumer of the per-interval grant maps.
///
/// 每个间隔授权表的消费者。
#[async_trait]
pub trait GrantSink: Send + Sync + 'static {
    async fn deliver(&self, node: Imsi, allocation: SubframeAllocation);
}

/// A `GrantSink` forwarding every allocation into a channel.
///
/// 将每个分配结果转发到通道的 `GrantSink`。
#[derive(Debug, Clone)]
pub struct ChannelGrantSink {
    tx: mpsc::Sender<(Imsi, SubframeAllocation)>,
}

impl ChannelGrantSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(Imsi, SubframeAllocation)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl GrantSink for ChannelGrantSink {
    async fn deliver(&self, node: Imsi, allocation: SubframeAllocation) {
        if self.tx.send((node, allocation)).await.is_err() {
            warn!(%node, "Grant receiver dropped, allocation discarded");
        }
    }
}
