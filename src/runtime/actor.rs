//! The implementation of the `NodeActor`.
//!
//! `NodeActor` 的实现。

use super::command::NodeCommand;
use crate::{error::Error, sched::NodeScheduler};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// The actor that owns one node's scheduler.
///
/// It runs in a dedicated task and processes commands from `NodeHandle`s one
/// at a time, so the scheduler itself needs no locking.
///
/// 拥有某节点调度器的actor。它在专用任务中运行，逐条处理来自 `NodeHandle` 的命令，
/// 因此调度器本身无需加锁。
pub(crate) struct NodeActor {
    pub(crate) scheduler: NodeScheduler,
    pub(crate) command_rx: mpsc::Receiver<NodeCommand>,
    /// First configuration error seen since the last trigger.
    /// 自上次触发以来遇到的第一个配置错误。
    pub(crate) fatal: Option<Error>,
}

impl NodeActor {
    pub(crate) fn new(scheduler: NodeScheduler, command_rx: mpsc::Receiver<NodeCommand>) -> Self {
        Self {
            scheduler,
            command_rx,
            fatal: None,
        }
    }

    /// Runs the actor's main loop until every handle is dropped.
    ///
    /// 运行 actor 的主循环，直到所有句柄都被丢弃。
    pub(crate) async fn run(mut self) {
        let node = self.scheduler.node();
        info!(%node, "Node actor started");
        while let Some(command) = self.command_rx.recv().await {
            self.handle_command(command);
        }
        info!(%node, "Node actor stopped");
    }

    fn record_fatal(&mut self, err: Error) {
        error!(node = %self.scheduler.node(), error = %err, "Configuration error in node");
        self.fatal.get_or_insert(err);
    }

    fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::ConfigureConnection(info) => self.scheduler.configure_connection(info),
            NodeCommand::ReleaseConnection(rnti) => self.scheduler.release_connection(rnti),
            NodeCommand::ReleaseLogicalChannel { rnti, lcid } => {
                self.scheduler.release_logical_channel(rnti, lcid)
            }
            NodeCommand::DlBuffer(report) => self.scheduler.on_dl_buffer_report(report),
            NodeCommand::UlBuffer(report) => self.scheduler.on_ul_buffer_report(report),
            NodeCommand::Quality(report) => self.scheduler.on_quality_report(report),
            NodeCommand::Feedback(feedback) => {
                if let Err(err) = self.scheduler.on_harq_feedback(feedback) {
                    self.record_fatal(err);
                }
            }
            NodeCommand::Busy(notification) => {
                if let Err(err) = self.scheduler.on_busy_notification(notification) {
                    self.record_fatal(err);
                }
            }
            NodeCommand::CollectSummary { response_tx } => {
                let _ = response_tx.send(self.scheduler.summary());
            }
            NodeCommand::Hint(hint) => {
                debug!(node = %self.scheduler.node(), target = ?hint.target, "Hint received");
                self.scheduler.apply_hint(hint);
            }
            NodeCommand::Trigger { sfn, response_tx } => {
                let result = match self.fatal.take() {
                    Some(err) => Err(err),
                    None => self.scheduler.schedule(sfn),
                };
                let _ = response_tx.send(result);
            }
        }
    }
}
