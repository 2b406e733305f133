//! 授权记录与每间隔的授权表。
//! Grant records and the per-interval grant map.

use crate::{
    identity::{Direction, Rnti, SfnSf},
    sched::{demand::PayloadKind, harq::HarqId},
};
use std::ops::Range;

/// Part of a grant's transport block reserved for one logical channel.
/// 授权传输块中为某逻辑信道保留的部分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadSlice {
    pub lcid: u8,
    pub kind: PayloadKind,
    pub bytes: u32,
}

/// Purpose of a grant.
/// 授权的用途。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// Reserved control region, not bound to a connection.
    /// 保留的控制区域，不绑定连接。
    Control,
    /// User data for one connection.
    /// 某连接的用户数据。
    Data,
}

/// One resource allocation (DCI) of an interval.
/// 某间隔中的一条资源分配（DCI）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Connection served, `None` for the control region.
    /// 被服务的连接，控制区域为 `None`。
    pub rnti: Option<Rnti>,
    pub direction: Direction,
    pub kind: GrantKind,
    pub sym_start: usize,
    pub num_sym: usize,
    pub mcs: u8,
    /// Transport block capacity in bytes.
    /// 传输块容量（字节）。
    pub tb_size: u32,
    pub harq_process: Option<HarqId>,
    /// Redundancy version: 0 for a first transmission.
    /// 冗余版本：首次传输为0。
    pub attempt: u8,
    pub new_data: bool,
    pub payload: Vec<PayloadSlice>,
    /// The uplink status PDU could not be carried whole and was left out.
    /// 上行状态PDU无法被完整承载，已被略过。
    pub status_omitted: bool,
}

impl Grant {
    /// Builds a control-region grant.
    /// 构造控制区域授权。
    pub fn control(direction: Direction, sym_start: usize, num_sym: usize) -> Self {
        Self {
            rnti: None,
            direction,
            kind: GrantKind::Control,
            sym_start,
            num_sym,
            mcs: 0,
            tb_size: 0,
            harq_process: None,
            attempt: 0,
            new_data: false,
            payload: Vec::new(),
            status_omitted: false,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.sym_start..self.sym_start + self.num_sym
    }

    pub fn is_retransmission(&self) -> bool {
        self.kind == GrantKind::Data && !self.new_data
    }
}

/// Complete grant map of one interval, ordered by start symbol.
/// 某间隔的完整授权表，按起始符号排序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubframeAllocation {
    pub sfn: SfnSf,
    pub grants: Vec<Grant>,
}

impl SubframeAllocation {
    /// Sorts `grants` by start symbol.
    /// 按起始符号排序 `grants`。
    pub fn new(sfn: SfnSf, mut grants: Vec<Grant>) -> Self {
        grants.sort_by_key(|g| g.sym_start);
        Self { sfn, grants }
    }

    pub fn data_grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter().filter(|g| g.kind == GrantKind::Data)
    }

    pub fn grants_for(&self, rnti: Rnti) -> impl Iterator<Item = &Grant> {
        self.grants.iter().filter(move |g| g.rnti == Some(rnti))
    }

    pub fn symbols_used(&self) -> usize {
        self.grants.iter().map(|g| g.num_sym).sum()
    }

    /// Whether grants are pairwise disjoint and inside `[0, total_symbols)`.
    /// 授权是否两两不相交且位于 `[0, total_symbols)` 内。
    pub fn is_consistent(&self, total_symbols: usize) -> bool {
        let mut end_of_previous = 0;
        for grant in &self.grants {
            if grant.num_sym == 0 || grant.sym_start < end_of_previous {
                return false;
            }
            end_of_previous = grant.sym_start + grant.num_sym;
        }
        end_of_previous <= total_symbols
    }
}
