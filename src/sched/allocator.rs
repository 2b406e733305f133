//! Symbol-Grid Allocator
//!
//! Turns pending retransmissions and buffered demand into grants on the
//! symbol grid of one interval. A pass over one partition of connections runs
//! retransmissions first, then sizes the new-data flows, divides the remaining
//! symbols fairly and emits contiguous grants, splitting across occupied
//! ranges where needed.
//!
//! 符号网格分配器
//!
//! 将待处理的重传和缓冲需求转换为一个间隔符号网格上的授权。对一组连接的一次分配先处理重传，
//! 再估算新数据流所需符号，公平划分剩余符号并发出连续授权，必要时跨越已占用区间拆分。

use crate::{
    amc::{TransportBlockModel, min_symbols_for},
    config::{Config, DirectionMode, FrameConfig},
    error::Result,
    identity::{ConnectionDirectory, Direction, Rnti, SfnSf},
    sched::{
        busy::{SymbolMask, find_run, free_run_at},
        demand::{DemandTracker, PayloadKind, PendingPdu, SUB_HEADER},
        fairness::{cap_relay_request, divide_fairly, shift_to_relays},
        grant::{Grant, GrantKind, PayloadSlice, SubframeAllocation},
        harq::{HarqManager, StoredGrant},
        link_quality::LinkQualityTracker,
    },
};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, trace};

/// Occupancy and grants of one interval.
/// 一个间隔的占用情况与授权。
#[derive(Debug)]
pub struct SymbolGrid {
    sfn: SfnSf,
    data_start: usize,
    data_end: usize,
    occupied: SymbolMask,
    grants: Vec<Grant>,
}

impl SymbolGrid {
    /// Creates the grid of an interval, emitting both control grants and
    /// blocking the busy symbols.
    ///
    /// 创建某间隔的网格，发出两个控制授权并屏蔽忙碌符号。
    pub fn new(sfn: SfnSf, frame: &FrameConfig, busy: &SymbolMask) -> Self {
        let total = frame.symbols_per_subframe;
        let data_start = frame.data_start();
        let data_end = frame.data_end();
        let mut occupied = SymbolMask::new(total);
        occupied.union_with(busy);
        occupied.set_range(0..data_start);
        occupied.set_range(data_end..total);

        let mut grants = Vec::with_capacity(2);
        if frame.dl_ctrl_symbols > 0 {
            grants.push(Grant::control(Direction::Downlink, 0, frame.dl_ctrl_symbols));
        }
        if frame.ul_ctrl_symbols > 0 {
            grants.push(Grant::control(Direction::Uplink, data_end, frame.ul_ctrl_symbols));
        }
        Self {
            sfn,
            data_start,
            data_end,
            occupied,
            grants,
        }
    }

    /// Free symbols left in the data region.
    /// 数据区域中剩余的空闲符号数。
    pub fn available(&self) -> usize {
        (self.data_end - self.data_start) - self.occupied.count_set_in(self.data_start..self.data_end)
    }

    /// Start of the first free run able to hold `len` symbols unsplit.
    /// 第一个能完整容纳 `len` 个符号的空闲段的起点。
    pub fn find_exact(&self, len: usize) -> Option<usize> {
        find_run(&self.occupied, self.data_start, len).map(|run| run.start)
    }

    /// Free runs, in symbol order, that together hold up to `symbols` symbols.
    /// 按符号顺序排列、合计最多容纳 `symbols` 个符号的空闲段。
    pub fn plan_runs(&self, symbols: usize) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut left = symbols;
        let mut from = self.data_start;
        while left > 0 {
            let Some(run) = find_run(&self.occupied, from, 1) else {
                break;
            };
            let len = run.len().min(left);
            runs.push(run.start..run.start + len);
            left -= len;
            from = run.end;
        }
        runs
    }

    pub fn free_run_at(&self, start: usize, max_len: usize) -> usize {
        free_run_at(&self.occupied, start, max_len)
    }

    /// Adds a grant and marks its symbols taken.
    /// 添加授权并将其符号标记为占用。
    pub fn claim(&mut self, grant: Grant) {
        trace!(sfn = %self.sfn, rnti = ?grant.rnti, start = grant.sym_start, len = grant.num_sym, "Grant placed");
        self.occupied.set_range(grant.range());
        self.grants.push(grant);
    }

    pub fn finish(self) -> SubframeAllocation {
        SubframeAllocation::new(self.sfn, self.grants)
    }
}

/// A sized new-data flow of one connection in one direction.
/// 某连接某方向上已估算尺寸的新数据流。
#[derive(Debug, Clone, Copy)]
struct Flow {
    rnti: Rnti,
    direction: Direction,
    relay: bool,
    mcs: u8,
    requested: usize,
    status_size: u32,
}

/// Per-connection share of the clipped transport block.
///
/// The plain average is `total / n`. PDUs below it are served whole and the
/// average is recomputed over the remaining ones.
///
/// 每个PDU在传输块中的平均份额。先取 `total / n`；小于平均值的PDU完整发送，
/// 再对其余PDU重新计算平均值。
fn average_pdu_share(total: u32, pdus: &[PendingPdu]) -> u32 {
    if pdus.is_empty() {
        return total;
    }
    let average = total / pdus.len() as u32;
    let (small_count, small_bytes) = pdus
        .iter()
        .filter(|p| p.size < average)
        .fold((0u32, 0u32), |(n, bytes), p| (n + 1, bytes.saturating_add(p.size)));
    let large_count = pdus.len() as u32 - small_count;
    if small_count == 0 || large_count == 0 {
        return average;
    }
    total.saturating_sub(small_bytes) / large_count
}

/// One allocation pass over the connections of a node.
/// 对一个节点上连接的一次分配。
pub struct Allocator<'a> {
    config: &'a Config,
    model: &'a dyn TransportBlockModel,
    directory: &'a ConnectionDirectory,
    link_quality: &'a LinkQualityTracker,
    demand: &'a mut DemandTracker,
    harq: &'a mut HarqManager,
    /// Symbols granted to each relay connection this interval.
    /// 本间隔内授予每个中继连接的符号数。
    relay_usage: BTreeMap<Rnti, usize>,
    relay_cap: usize,
}

impl<'a> Allocator<'a> {
    /// `interval_available` is the number of free data symbols at the start of the interval.
    /// `interval_available` 是间隔开始时数据区域的空闲符号数。
    pub fn new(
        config: &'a Config,
        model: &'a dyn TransportBlockModel,
        directory: &'a ConnectionDirectory,
        link_quality: &'a LinkQualityTracker,
        demand: &'a mut DemandTracker,
        harq: &'a mut HarqManager,
        interval_available: usize,
    ) -> Self {
        Self {
            config,
            model,
            directory,
            link_quality,
            demand,
            harq,
            relay_usage: BTreeMap::new(),
            relay_cap: interval_available / config.allocation.relay_share_divisor,
        }
    }

    /// Runs the retransmission pass and then the new-data pass for `rntis`.
    /// 对 `rntis` 依次执行重传分配和新数据分配。
    pub fn run_partition(&mut self, grid: &mut SymbolGrid, rntis: &[Rnti]) -> Result<()> {
        self.retransmission_pass(grid, rntis)?;
        self.new_data_pass(grid, rntis)
    }

    fn note_relay_usage(&mut self, rnti: Rnti, symbols: usize) {
        if self.directory.is_relay(rnti) {
            *self.relay_usage.entry(rnti).or_default() += symbols;
        }
    }

    fn retransmission_pass(&mut self, grid: &mut SymbolGrid, rntis: &[Rnti]) -> Result<()> {
        let pending = self.harq.pending_retransmissions();
        for retx in pending.into_iter().filter(|p| rntis.contains(&p.rnti)) {
            if self.directory.is_relay(retx.rnti) && retx.grant.num_sym > self.relay_headroom(retx.rnti) {
                debug!(
                    rnti = %retx.rnti,
                    harq_id = retx.process,
                    attempt = retx.attempt,
                    num_sym = retx.grant.num_sym,
                    headroom = self.relay_headroom(retx.rnti),
                    "Relay retransmission above cap, deferred"
                );
                continue;
            }
            let Some(start) = grid.find_exact(retx.grant.num_sym) else {
                debug!(
                    rnti = %retx.rnti,
                    direction = ?retx.direction,
                    harq_id = retx.process,
                    attempt = retx.attempt,
                    "No room for retransmission, deferred"
                );
                continue;
            };
            let Some(attempt) = self
                .harq
                .mark_retransmitted(retx.rnti, retx.direction, retx.process)?
            else {
                continue;
            };
            debug!(
                rnti = %retx.rnti,
                direction = ?retx.direction,
                harq_id = retx.process,
                attempt,
                start,
                "Retransmission scheduled"
            );
            grid.claim(Grant {
                rnti: Some(retx.rnti),
                direction: retx.direction,
                kind: GrantKind::Data,
                sym_start: start,
                num_sym: retx.grant.num_sym,
                mcs: retx.grant.mcs,
                tb_size: retx.grant.tb_size,
                harq_process: Some(retx.process),
                attempt,
                new_data: false,
                payload: retx.grant.payload,
                status_omitted: false,
            });
            self.note_relay_usage(retx.rnti, retx.grant.num_sym);
        }
        Ok(())
    }

    fn size_flows(&self, rntis: &[Rnti]) -> Vec<Flow> {
        let mode = self.config.allocation.direction;
        let max_symbols = self.config.frame.data_symbols();
        let mut flows = Vec::new();

        for &rnti in rntis {
            let Some(info) = self.directory.get(rnti) else {
                continue;
            };
            if mode != DirectionMode::UplinkOnly {
                let bytes: u32 = self
                    .demand
                    .downlink_pdus(rnti)
                    .iter()
                    .fold(0u32, |total, p| total.saturating_add(p.size));
                let mcs = self.link_quality.coding_scheme(rnti, Direction::Downlink);
                match mcs {
                    Some(mcs) if bytes > 0 && self.harq.has_free_process(rnti, Direction::Downlink) => {
                        let requirement = min_symbols_for(self.model, mcs, bytes, max_symbols);
                        flows.push(Flow {
                            rnti,
                            direction: Direction::Downlink,
                            relay: info.relay,
                            mcs,
                            requested: requirement.symbols,
                            status_size: 0,
                        });
                    }
                    None if bytes > 0 => trace!(%rnti, "Downlink out of range, skipped"),
                    _ => {}
                }
            }
            if mode != DirectionMode::DownlinkOnly {
                let request = self.demand.uplink_request(rnti);
                let mcs = self.link_quality.coding_scheme(rnti, Direction::Uplink);
                if let (Some(request), Some(mcs)) = (request, mcs) {
                    if self.harq.has_free_process(rnti, Direction::Uplink) {
                        let requirement = min_symbols_for(self.model, mcs, request.size, max_symbols);
                        flows.push(Flow {
                            rnti,
                            direction: Direction::Uplink,
                            relay: info.relay,
                            mcs,
                            requested: requirement.symbols,
                            status_size: request.status_size,
                        });
                    }
                }
            }
        }
        flows
    }

    /// Remaining relay budget of a connection this interval.
    /// 某连接本间隔剩余的中继预算。
    fn relay_headroom(&self, rnti: Rnti) -> usize {
        self.relay_cap
            .saturating_sub(self.relay_usage.get(&rnti).copied().unwrap_or(0))
    }

    fn apply_relay_cap(&self, flows: &mut [Flow]) {
        let relays: Vec<Rnti> = flows.iter().filter(|f| f.relay).map(|f| f.rnti).collect();
        for rnti in relays {
            let find = |direction| {
                flows
                    .iter()
                    .position(|f| f.rnti == rnti && f.direction == direction)
            };
            let (dl, ul) = (find(Direction::Downlink), find(Direction::Uplink));
            let requested = |i: Option<usize>| i.map_or(0, |i| flows[i].requested);
            let (dl_req, ul_req) = (requested(dl), requested(ul));
            let headroom = self.relay_headroom(rnti);
            let (dl_capped, ul_capped) = cap_relay_request(dl_req, ul_req, headroom);
            if dl_capped + ul_capped < dl_req + ul_req {
                debug!(%rnti, dl_req, ul_req, headroom, dl_capped, ul_capped, "Relay request capped");
            }
            if let Some(i) = dl {
                flows[i].requested = dl_capped;
            }
            if let Some(i) = ul {
                flows[i].requested = ul_capped;
            }
        }
    }

    fn new_data_pass(&mut self, grid: &mut SymbolGrid, rntis: &[Rnti]) -> Result<()> {
        let available = grid.available();
        if available == 0 {
            return Ok(());
        }
        let mut flows = self.size_flows(rntis);
        self.apply_relay_cap(&mut flows);
        flows.retain(|f| f.requested > 0);
        if flows.is_empty() {
            return Ok(());
        }

        let requests: Vec<usize> = flows.iter().map(|f| f.requested).collect();
        let mut shares = divide_fairly(&requests, available);

        let eta = self.config.allocation.relay_boost_eta;
        if eta > 0.0 {
            let donors: Vec<usize> = flows
                .iter()
                .enumerate()
                .filter(|(_, f)| !f.relay && f.direction == Direction::Downlink)
                .map(|(i, _)| i)
                .collect();
            let receivers: Vec<(usize, usize)> = flows
                .iter()
                .enumerate()
                .filter(|(_, f)| f.relay && f.direction == Direction::Downlink)
                .map(|(i, f)| {
                    let granted: usize = flows
                        .iter()
                        .zip(shares.iter())
                        .filter(|(g, _)| g.rnti == f.rnti)
                        .map(|(_, s)| *s)
                        .sum();
                    (i, self.relay_headroom(f.rnti).saturating_sub(granted))
                })
                .collect();
            let moved = shift_to_relays(&mut shares, &requests, &donors, &receivers, eta);
            if moved > 0 {
                debug!(moved, eta, "Symbols shifted from terminals to relays");
            }
        }

        for (flow, share) in flows.iter().zip(shares) {
            if share == 0 {
                continue;
            }
            let used = match flow.direction {
                Direction::Downlink => self.emit_downlink(grid, flow, share)?,
                Direction::Uplink => self.emit_uplink(grid, flow, share)?,
            };
            self.note_relay_usage(flow.rnti, used);
        }
        Ok(())
    }

    fn emit_downlink(&mut self, grid: &mut SymbolGrid, flow: &Flow, share: usize) -> Result<usize> {
        let rnti = flow.rnti;
        let mut pdus = self.demand.downlink_pdus(rnti);
        let runs = grid.plan_runs(share);
        let total_tb: u32 = runs
            .iter()
            .map(|r| self.model.tb_size_bytes(flow.mcs, r.len()))
            .sum();
        let average = average_pdu_share(total_tb, &pdus);
        for pdu in pdus.iter_mut().filter(|p| p.kind != PayloadKind::Status) {
            pdu.size = pdu.size.min(average);
        }

        let mut used = 0;
        for run in runs {
            if pdus.is_empty() {
                break;
            }
            let Some(harq_id) = self.harq.allocate_process_id(rnti, Direction::Downlink)? else {
                debug!(%rnti, "No free downlink HARQ process, remaining share deferred");
                break;
            };
            let tb_size = self.model.tb_size_bytes(flow.mcs, run.len());
            let mut remaining = tb_size;
            let mut payload = Vec::new();
            let mut index = 0;
            while remaining > SUB_HEADER && index < pdus.len() {
                let pdu = &mut pdus[index];
                if pdu.kind == PayloadKind::Status && pdu.size > remaining {
                    index += 1;
                    continue;
                }
                let slice = remaining.min(pdu.size);
                payload.push(PayloadSlice {
                    lcid: pdu.lcid,
                    kind: pdu.kind,
                    bytes: slice,
                });
                self.demand
                    .consume(rnti, pdu.lcid, slice.saturating_sub(SUB_HEADER));
                remaining -= slice;
                pdu.size -= slice;
                if pdu.size == 0 {
                    pdus.remove(index);
                } else {
                    index += 1;
                }
            }
            if payload.is_empty() {
                break;
            }

            self.harq.store(
                rnti,
                Direction::Downlink,
                harq_id,
                StoredGrant {
                    num_sym: run.len(),
                    mcs: flow.mcs,
                    tb_size,
                    payload: payload.clone(),
                },
            )?;
            used += run.len();
            grid.claim(Grant {
                rnti: Some(rnti),
                direction: Direction::Downlink,
                kind: GrantKind::Data,
                sym_start: run.start,
                num_sym: run.len(),
                mcs: flow.mcs,
                tb_size,
                harq_process: Some(harq_id),
                attempt: 0,
                new_data: true,
                payload,
                status_omitted: false,
            });
        }
        Ok(used)
    }

    /// Finds a run able to carry the uplink status PDU whole.
    /// 查找能完整承载上行状态PDU的符号段。
    fn status_run(&self, grid: &SymbolGrid, flow: &Flow, share: usize) -> Option<Range<usize>> {
        let needed = min_symbols_for(
            self.model,
            flow.mcs,
            flow.status_size.saturating_add(1),
            self.config.frame.data_symbols(),
        );
        if needed.symbols > share || needed.tb_size <= flow.status_size {
            return None;
        }
        let start = grid.find_exact(needed.symbols)?;
        Some(start..start + grid.free_run_at(start, share))
    }

    fn emit_uplink(&mut self, grid: &mut SymbolGrid, flow: &Flow, share: usize) -> Result<usize> {
        let rnti = flow.rnti;
        let mut status_run = None;
        let mut status_omitted = false;
        if flow.status_size > 0 {
            status_run = self.status_run(grid, flow, share);
            if status_run.is_none() {
                debug!(%rnti, status_size = flow.status_size, "Uplink status PDU does not fit whole, omitted");
                status_omitted = true;
            }
        }

        let mut used = 0;
        let mut first = true;
        while used < share {
            let run = match status_run.take() {
                Some(run) => run,
                None => match grid.plan_runs(share - used).into_iter().next() {
                    Some(run) => run,
                    None => break,
                },
            };
            let len = run.len().min(share - used);
            let Some(harq_id) = self.harq.allocate_process_id(rnti, Direction::Uplink)? else {
                debug!(%rnti, "No free uplink HARQ process, remaining share deferred");
                break;
            };
            let tb_size = self.model.tb_size_bytes(flow.mcs, len);
            let status_carried = first && flow.status_size > 0 && !status_omitted;
            self.demand
                .consume_uplink(rnti, tb_size.saturating_sub(SUB_HEADER), status_carried);
            self.harq.store(
                rnti,
                Direction::Uplink,
                harq_id,
                StoredGrant {
                    num_sym: len,
                    mcs: flow.mcs,
                    tb_size,
                    payload: Vec::new(),
                },
            )?;
            grid.claim(Grant {
                rnti: Some(rnti),
                direction: Direction::Uplink,
                kind: GrantKind::Data,
                sym_start: run.start,
                num_sym: len,
                mcs: flow.mcs,
                tb_size,
                harq_process: Some(harq_id),
                attempt: 0,
                new_data: true,
                payload: Vec::new(),
                status_omitted: first && status_omitted,
            });
            used += len;
            first = false;
        }
        Ok(used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame() -> FrameConfig {
        FrameConfig {
            symbols_per_subframe: 12,
            ..Default::default()
        }
    }

    #[test]
    fn test_grid_reserves_control_symbols() {
        let frame = create_test_frame();
        let grid = SymbolGrid::new(SfnSf::new(0, 0), &frame, &SymbolMask::new(12));
        assert_eq!(grid.available(), 10);
        let alloc = grid.finish();
        assert_eq!(alloc.grants.len(), 2);
        assert_eq!(alloc.grants[0].range(), 0..1);
        assert_eq!(alloc.grants[1].range(), 11..12);
        assert!(alloc.grants.iter().all(|g| g.kind == GrantKind::Control));
    }

    #[test]
    fn test_grid_subtracts_busy_symbols() {
        let frame = create_test_frame();
        let mut busy = SymbolMask::new(12);
        busy.set_range(3..6);
        let grid = SymbolGrid::new(SfnSf::new(0, 0), &frame, &busy);
        assert_eq!(grid.available(), 7);
        assert_eq!(grid.find_exact(3), Some(6));
        assert_eq!(grid.find_exact(2), Some(1));
        assert_eq!(grid.plan_runs(4), vec![1..3, 6..8]);
        // 数据区域之外的控制符号永不分配
        assert_eq!(grid.find_exact(6), None);
    }

    #[test]
    fn test_average_share_excludes_small_pdus() {
        let pdu = |size| PendingPdu {
            lcid: 3,
            kind: PayloadKind::NewData,
            size,
        };
        // 平均300，40字节的PDU低于平均，剩余 (900-40)/2 = 430
        assert_eq!(average_pdu_share(900, &[pdu(40), pdu(1000), pdu(2000)]), 430);
        assert_eq!(average_pdu_share(900, &[pdu(1000), pdu(2000)]), 450);
        assert_eq!(average_pdu_share(900, &[]), 900);
    }
}
