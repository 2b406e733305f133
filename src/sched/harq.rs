//! Retransmission (HARQ) Manager
//!
//! Every configured connection owns a fixed array of HARQ processes per link
//! direction. A process remembers the grant of its last attempt so a
//! retransmission can replay it with the same size, and it is released on
//! acknowledgment, on attempt-budget exhaustion or when feedback never arrives.
//!
//! 重传 (HARQ) 管理器
//!
//! 每个已配置连接在每个链路方向上拥有固定数量的HARQ进程。进程记住最后一次尝试的授权，
//! 以便按相同大小重放；在收到确认、重传次数耗尽或反馈超时时释放。

use crate::{
    config::HarqConfig,
    error::{Error, Result},
    identity::{Direction, Rnti},
    sched::grant::PayloadSlice,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Index of a HARQ process within a connection.
/// 连接内的HARQ进程索引。
pub type HarqId = u8;

/// Highest redundancy version a process may reach.
/// 进程可达到的最高冗余版本。
pub const MAX_ATTEMPT: u8 = 3;

/// Acknowledgment carried by HARQ feedback.
/// HARQ反馈携带的确认。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Ack,
    Nack,
}

/// HARQ feedback for one process.
/// 某进程的HARQ反馈。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarqFeedback {
    pub rnti: Rnti,
    pub direction: Direction,
    pub process: HarqId,
    pub feedback: Feedback,
}

/// Grant parameters stored for a retransmission.
/// 为重传保存的授权参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGrant {
    pub num_sym: usize,
    pub mcs: u8,
    pub tb_size: u32,
    pub payload: Vec<PayloadSlice>,
}

/// Lifecycle state of a process.
/// 进程的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Free,
    /// Transmitted, feedback outstanding for `timer` intervals.
    /// 已发送，已等待反馈 `timer` 个间隔。
    AwaitingFeedback { attempt: u8, timer: u32 },
    /// NACKed, waiting for symbols to retransmit in.
    /// 已收到NACK，等待可用于重传的符号。
    PendingRetransmission { attempt: u8 },
}

/// What a feedback message did to its process.
/// 反馈对其进程产生的效果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Released,
    RetransmissionQueued { attempt: u8 },
    /// Attempt budget exhausted, buffered data discarded.
    /// 重传次数耗尽，缓冲数据被丢弃。
    Dropped,
    /// Stale or duplicate feedback.
    /// 过期或重复的反馈。
    Ignored,
}

/// A retransmission waiting to be placed.
/// 等待放置的重传。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRetransmission {
    pub rnti: Rnti,
    pub direction: Direction,
    pub process: HarqId,
    pub attempt: u8,
    pub grant: StoredGrant,
}

#[derive(Debug, Clone)]
struct HarqProcess {
    state: ProcessState,
    grant: Option<StoredGrant>,
}

impl HarqProcess {
    fn free() -> Self {
        Self {
            state: ProcessState::Free,
            grant: None,
        }
    }

    fn release(&mut self) {
        *self = Self::free();
    }
}

/// HARQ process arrays of every connection on one node.
/// 一个节点上所有连接的HARQ进程数组。
#[derive(Debug)]
pub struct HarqManager {
    enabled: bool,
    num_processes: u8,
    feedback_timeout: u32,
    processes: BTreeMap<(Rnti, Direction), Vec<HarqProcess>>,
    /// Round-robin cursor used when HARQ is disabled.
    /// 禁用HARQ时使用的轮询游标。
    next_id: BTreeMap<(Rnti, Direction), HarqId>,
}

impl HarqManager {
    /// Creates a new manager.
    /// 创建新的管理器。
    pub fn new(config: &HarqConfig) -> Self {
        Self {
            enabled: config.enabled,
            num_processes: config.num_processes,
            feedback_timeout: config.feedback_timeout,
            processes: BTreeMap::new(),
            next_id: BTreeMap::new(),
        }
    }

    /// Creates the process arrays of a connection. Existing arrays are kept.
    /// 创建某连接的进程数组，已存在的数组保持不变。
    pub fn add_connection(&mut self, rnti: Rnti) {
        for direction in [Direction::Downlink, Direction::Uplink] {
            self.processes
                .entry((rnti, direction))
                .or_insert_with(|| vec![HarqProcess::free(); usize::from(self.num_processes)]);
            self.next_id.entry((rnti, direction)).or_insert(0);
        }
    }

    pub fn remove_connection(&mut self, rnti: Rnti) {
        for direction in [Direction::Downlink, Direction::Uplink] {
            self.processes.remove(&(rnti, direction));
            self.next_id.remove(&(rnti, direction));
        }
    }

    fn processes_mut(&mut self, rnti: Rnti, direction: Direction) -> Result<&mut Vec<HarqProcess>> {
        self.processes
            .get_mut(&(rnti, direction))
            .ok_or(Error::UnknownConnection(rnti))
    }

    fn process_mut(
        &mut self,
        rnti: Rnti,
        direction: Direction,
        process: HarqId,
    ) -> Result<&mut HarqProcess> {
        self.processes_mut(rnti, direction)?
            .get_mut(usize::from(process))
            .ok_or(Error::HarqProcessOutOfRange { rnti, process })
    }

    /// Returns the first free process id, or `None` when every process is busy.
    ///
    /// Asking for a connection that was never configured is a setup-ordering
    /// bug and returns `Error::UnknownConnection`.
    ///
    /// 返回第一个空闲进程ID，所有进程都忙时返回 `None`。
    /// 请求从未配置过的连接属于初始化顺序错误，返回 `Error::UnknownConnection`。
    pub fn allocate_process_id(&mut self, rnti: Rnti, direction: Direction) -> Result<Option<HarqId>> {
        if !self.enabled {
            let num_processes = self.num_processes;
            let cursor = self
                .next_id
                .get_mut(&(rnti, direction))
                .ok_or(Error::UnknownConnection(rnti))?;
            let id = *cursor;
            *cursor = (id + 1) % num_processes;
            return Ok(Some(id));
        }
        let id = self
            .processes_mut(rnti, direction)?
            .iter()
            .position(|p| p.state == ProcessState::Free)
            .and_then(|i| HarqId::try_from(i).ok());
        if id.is_none() {
            debug!(%rnti, ?direction, "No free HARQ process");
        }
        Ok(id)
    }

    /// Whether a new transmission could get a process right now.
    /// 新传输当前能否获得进程。
    pub fn has_free_process(&self, rnti: Rnti, direction: Direction) -> bool {
        if !self.enabled {
            return self.processes.contains_key(&(rnti, direction));
        }
        self.processes
            .get(&(rnti, direction))
            .is_some_and(|ps| ps.iter().any(|p| p.state == ProcessState::Free))
    }

    /// Records a first transmission on a process.
    /// 记录某进程上的首次传输。
    pub fn store(
        &mut self,
        rnti: Rnti,
        direction: Direction,
        process: HarqId,
        grant: StoredGrant,
    ) -> Result<()> {
        let enabled = self.enabled;
        let slot = self.process_mut(rnti, direction, process)?;
        if !enabled {
            return Ok(());
        }
        slot.state = ProcessState::AwaitingFeedback {
            attempt: 0,
            timer: 0,
        };
        slot.grant = Some(grant);
        trace!(%rnti, ?direction, harq_id = process, "HARQ process stored");
        Ok(())
    }

    /// Applies ACK or NACK feedback to a process.
    /// 对某进程应用ACK或NACK反馈。
    pub fn on_feedback(&mut self, feedback: HarqFeedback) -> Result<FeedbackOutcome> {
        let HarqFeedback {
            rnti,
            direction,
            process,
            feedback,
        } = feedback;
        let enabled = self.enabled;
        let slot = self.process_mut(rnti, direction, process)?;
        if !enabled {
            return Ok(FeedbackOutcome::Ignored);
        }

        let outcome = match (feedback, slot.state) {
            (_, ProcessState::Free) => FeedbackOutcome::Ignored,
            (Feedback::Ack, _) => {
                slot.release();
                FeedbackOutcome::Released
            }
            (Feedback::Nack, ProcessState::PendingRetransmission { .. }) => FeedbackOutcome::Ignored,
            (Feedback::Nack, ProcessState::AwaitingFeedback { attempt, .. }) => {
                if attempt >= MAX_ATTEMPT {
                    slot.release();
                    FeedbackOutcome::Dropped
                } else {
                    slot.state = ProcessState::PendingRetransmission { attempt };
                    FeedbackOutcome::RetransmissionQueued { attempt }
                }
            }
        };
        debug!(%rnti, ?direction, harq_id = process, ?feedback, ?outcome, "HARQ feedback");
        Ok(outcome)
    }

    /// Retransmissions waiting for placement, in (connection, direction, process) order.
    /// 等待放置的重传，按（连接，方向，进程）排序。
    pub fn pending_retransmissions(&self) -> Vec<PendingRetransmission> {
        let mut pending = Vec::new();
        for (&(rnti, direction), processes) in &self.processes {
            for (index, process) in processes.iter().enumerate() {
                let (ProcessState::PendingRetransmission { attempt }, Some(grant)) =
                    (process.state, process.grant.as_ref())
                else {
                    continue;
                };
                let Ok(process) = HarqId::try_from(index) else {
                    continue;
                };
                pending.push(PendingRetransmission {
                    rnti,
                    direction,
                    process,
                    attempt,
                    grant: grant.clone(),
                });
            }
        }
        pending
    }

    /// Marks a pending retransmission as transmitted. Returns the new attempt number.
    /// 将待重传标记为已发送，返回新的尝试次数。
    pub fn mark_retransmitted(
        &mut self,
        rnti: Rnti,
        direction: Direction,
        process: HarqId,
    ) -> Result<Option<u8>> {
        let slot = self.process_mut(rnti, direction, process)?;
        let ProcessState::PendingRetransmission { attempt } = slot.state else {
            return Ok(None);
        };
        let attempt = attempt + 1;
        slot.state = ProcessState::AwaitingFeedback { attempt, timer: 0 };
        Ok(Some(attempt))
    }

    /// Advances feedback timers by one interval and frees expired processes.
    /// Returns the number of processes freed.
    ///
    /// 将反馈计时器推进一个间隔并释放超时进程，返回被释放的进程数。
    pub fn tick(&mut self) -> usize {
        let timeout = self.feedback_timeout;
        let mut freed = 0;
        for (&(rnti, direction), processes) in self.processes.iter_mut() {
            for (index, process) in processes.iter_mut().enumerate() {
                if let ProcessState::AwaitingFeedback { attempt, timer } = process.state {
                    let timer = timer + 1;
                    if timer >= timeout {
                        debug!(%rnti, ?direction, harq_id = index, attempt, "HARQ feedback timeout");
                        process.release();
                        freed += 1;
                    } else {
                        process.state = ProcessState::AwaitingFeedback { attempt, timer };
                    }
                }
            }
        }
        freed
    }

    pub fn state(&self, rnti: Rnti, direction: Direction, process: HarqId) -> Option<ProcessState> {
        self.processes
            .get(&(rnti, direction))?
            .get(usize::from(process))
            .map(|p| p.state)
    }

    pub fn stored_grant(&self, rnti: Rnti, direction: Direction, process: HarqId) -> Option<&StoredGrant> {
        self.processes
            .get(&(rnti, direction))?
            .get(usize::from(process))?
            .grant
            .as_ref()
    }
}
