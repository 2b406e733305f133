//! Commands used by the node actor.

use crate::{
    central::{NodeSummary, SchedulingHint},
    error::Result,
    identity::{ConnectionInfo, Rnti, SfnSf},
    sched::{
        BusyNotification, DlBufferReport, HarqFeedback, QualityReport, SubframeAllocation,
        UlBufferReport,
    },
};
use tokio::sync::oneshot;

/// Commands sent to the `NodeActor`.
///
/// Reports are applied in arrival order, so a report sent after a trigger only
/// takes effect in the following interval.
///
/// 发送到 `NodeActor` 的命令。
///
/// 报告按到达顺序生效，因此在触发之后发送的报告只在下一个间隔生效。
#[derive(Debug)]
pub enum NodeCommand {
    ConfigureConnection(ConnectionInfo),
    ReleaseConnection(Rnti),
    ReleaseLogicalChannel {
        rnti: Rnti,
        lcid: u8,
    },
    DlBuffer(DlBufferReport),
    UlBuffer(UlBufferReport),
    Quality(QualityReport),
    Feedback(HarqFeedback),
    Busy(BusyNotification),
    /// Request for the node's summary.
    /// 请求节点汇总。
    CollectSummary {
        response_tx: oneshot::Sender<NodeSummary>,
    },
    /// Preference for the next triggered interval.
    /// 下一次触发间隔的偏好。
    Hint(SchedulingHint),
    /// Runs one scheduling pass.
    /// 执行一次调度。
    Trigger {
        sfn: SfnSf,
        response_tx: oneshot::Sender<Result<SubframeAllocation>>,
    },
}
