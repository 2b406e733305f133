//! Demand Tracker
//!
//! Keeps the buffered-byte picture of every connection: per logical channel
//! for the downlink, one cumulative buffer report for the uplink.
//!
//! 需求跟踪器
//!
//! 保存每个连接的缓冲字节情况：下行按逻辑信道，上行为一个累计缓冲区报告。

use crate::identity::Rnti;
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// MAC header bytes per transport block.
/// 每个传输块的MAC头字节数。
pub const MAC_HEADER: u32 = 0;
/// MAC sub-header bytes per PDU.
/// 每个PDU的MAC子头字节数。
pub const SUB_HEADER: u32 = 4;
/// RLC header bytes per PDU.
/// 每个PDU的RLC头字节数。
pub const RLC_HEADER: u32 = 3;

const MIN_DL_PDU: u32 = 8;
const DL_PDU_MARGIN: u32 = 10;
const UL_BUFFER_MARGIN: u32 = 8;
const UL_CONSUME_OVERHEAD: u32 = 2;

/// Header overhead charged against a downlink grant before data is decremented.
/// 在扣减数据前从下行授权中扣除的头开销。
pub fn rlc_overhead(lcid: u8) -> u32 {
    if lcid == 1 { 4 } else { 2 }
}

/// Downlink buffer report of one logical channel.
/// 一个逻辑信道的下行缓冲区报告。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlBufferReport {
    pub rnti: Rnti,
    pub lcid: u8,
    pub new_bytes: u32,
    pub retx_bytes: u32,
    pub status_bytes: u32,
}

/// Uplink buffer status report of one connection.
/// 一个连接的上行缓冲区状态报告。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlBufferReport {
    pub rnti: Rnti,
    pub buffered_bytes: u32,
    pub status_bytes: u32,
}

/// Downlink demand of one logical channel.
/// 一个逻辑信道的下行需求。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelDemand {
    pub new_bytes: u32,
    pub retx_bytes: u32,
    pub status_bytes: u32,
}

impl ChannelDemand {
    pub fn is_empty(&self) -> bool {
        self.new_bytes == 0 && self.retx_bytes == 0 && self.status_bytes == 0
    }
}

/// Uplink buffer report of one connection.
/// 一个连接的上行缓冲区报告。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UplinkDemand {
    pub buffered_bytes: u32,
    pub status_bytes: u32,
}

/// Payload class of a PDU, in transmission priority order.
/// PDU的负载类别，按传输优先级排序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PayloadKind {
    Status,
    Retransmission,
    NewData,
}

/// A downlink PDU waiting for transmission.
/// 一个等待传输的下行PDU。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPdu {
    pub lcid: u8,
    pub kind: PayloadKind,
    pub size: u32,
}

/// Uplink sizing input of one connection.
/// 一个连接的上行尺寸输入。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkRequest {
    /// Bytes to size the uplink grant for.
    /// 上行授权的目标字节数。
    pub size: u32,
    /// Smallest unit that must not be fragmented.
    /// 不可分片的最小单位。
    pub status_size: u32,
}

/// Buffered demand of every connection on one node.
/// 一个节点上所有连接的缓冲需求。
#[derive(Debug, Default)]
pub struct DemandTracker {
    downlink: BTreeMap<Rnti, BTreeMap<u8, ChannelDemand>>,
    uplink: BTreeMap<Rnti, UplinkDemand>,
}

impl DemandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the downlink record of one (connection, channel) pair.
    /// 替换某（连接，信道）对的下行记录。
    pub fn merge_downlink_report(
        &mut self,
        rnti: Rnti,
        lcid: u8,
        new_bytes: u32,
        retx_bytes: u32,
        status_bytes: u32,
    ) {
        trace!(%rnti, lcid, new_bytes, retx_bytes, status_bytes, "Downlink buffer report");
        self.downlink.entry(rnti).or_default().insert(
            lcid,
            ChannelDemand {
                new_bytes,
                retx_bytes,
                status_bytes,
            },
        );
    }

    /// Replaces the uplink buffer report of a connection.
    /// 替换某连接的上行缓冲区报告。
    pub fn merge_uplink_report(&mut self, rnti: Rnti, buffered_bytes: u32, status_bytes: u32) {
        trace!(%rnti, buffered_bytes, status_bytes, "Uplink buffer report");
        self.uplink.insert(
            rnti,
            UplinkDemand {
                buffered_bytes,
                status_bytes,
            },
        );
    }

    /// Decrements downlink demand by granted bytes in status → retransmission →
    /// new-data order. A status PDU is only cleared when carried whole.
    ///
    /// 按 状态 → 重传 → 新数据 的顺序用授权字节扣减下行需求。只有完整承载时才清除状态PDU。
    pub fn consume(&mut self, rnti: Rnti, lcid: u8, granted: u32) {
        let Some(channel) = self
            .downlink
            .get_mut(&rnti)
            .and_then(|channels| channels.get_mut(&lcid))
        else {
            warn!(%rnti, lcid, granted, "Consuming demand of an unknown channel, ignoring");
            return;
        };

        let mut remaining = granted;
        if channel.status_bytes > 0 && remaining >= channel.status_bytes {
            remaining -= channel.status_bytes;
            channel.status_bytes = 0;
        }
        if remaining > 0 && (channel.retx_bytes > 0 || channel.new_bytes > 0) {
            remaining = remaining.saturating_sub(rlc_overhead(lcid));
            let from_retx = remaining.min(channel.retx_bytes);
            channel.retx_bytes -= from_retx;
            remaining -= from_retx;
            channel.new_bytes = channel.new_bytes.saturating_sub(remaining);
        }
        trace!(%rnti, lcid, granted, ?channel, "Downlink demand consumed");
    }

    /// Decrements the uplink buffer report after a grant.
    /// 授权后扣减上行缓冲区报告。
    pub fn consume_uplink(&mut self, rnti: Rnti, granted: u32, status_carried: bool) {
        let Some(report) = self.uplink.get_mut(&rnti) else {
            warn!(%rnti, granted, "Consuming uplink demand of an unknown connection, ignoring");
            return;
        };
        let mut remaining = granted.saturating_sub(UL_CONSUME_OVERHEAD);
        if status_carried && report.status_bytes > 0 {
            let status = report.status_bytes.min(remaining);
            remaining -= status;
            if status == report.status_bytes {
                report.status_bytes = 0;
            }
        }
        report.buffered_bytes = report.buffered_bytes.saturating_sub(remaining);
        trace!(%rnti, granted, ?report, "Uplink demand consumed");
    }

    /// Pending downlink PDUs of a connection ordered status, retransmission, new data.
    /// 某连接待发送的下行PDU，按 状态、重传、新数据 排序。
    pub fn downlink_pdus(&self, rnti: Rnti) -> Vec<PendingPdu> {
        let mut pdus = Vec::new();
        let Some(channels) = self.downlink.get(&rnti) else {
            return pdus;
        };
        for (&lcid, demand) in channels {
            if demand.status_bytes > 0 {
                pdus.push(PendingPdu {
                    lcid,
                    kind: PayloadKind::Status,
                    size: demand.status_bytes.saturating_add(SUB_HEADER),
                });
            }
            let (kind, bytes) = if demand.retx_bytes > 0 {
                (PayloadKind::Retransmission, demand.retx_bytes)
            } else {
                (PayloadKind::NewData, demand.new_bytes)
            };
            if bytes > 0 {
                pdus.push(PendingPdu {
                    lcid,
                    kind,
                    size: bytes
                        .max(MIN_DL_PDU)
                        .saturating_add(RLC_HEADER + SUB_HEADER + DL_PDU_MARGIN),
                });
            }
        }
        pdus.sort_by_key(|p| (p.kind, p.lcid));
        pdus
    }

    /// Uplink sizing input, `None` when nothing is buffered.
    /// 上行尺寸输入，无缓冲时为 `None`。
    pub fn uplink_request(&self, rnti: Rnti) -> Option<UplinkRequest> {
        let report = self.uplink.get(&rnti)?;
        if report.buffered_bytes == 0 && report.status_bytes == 0 {
            return None;
        }
        Some(UplinkRequest {
            size: report
                .buffered_bytes
                .saturating_add(RLC_HEADER + MAC_HEADER + UL_BUFFER_MARGIN),
            status_size: report.status_bytes,
        })
    }

    pub fn channel(&self, rnti: Rnti, lcid: u8) -> Option<ChannelDemand> {
        self.downlink.get(&rnti)?.get(&lcid).copied()
    }

    pub fn uplink(&self, rnti: Rnti) -> Option<UplinkDemand> {
        self.uplink.get(&rnti).copied()
    }

    /// Downlink bytes waiting in new-data and retransmission queues.
    /// 在新数据和重传队列中等待的下行字节数。
    pub fn downlink_backlog(&self, rnti: Rnti) -> u64 {
        self.downlink.get(&rnti).map_or(0, |channels| {
            channels
                .values()
                .map(|c| u64::from(c.new_bytes) + u64::from(c.retx_bytes))
                .sum()
        })
    }

    pub fn uplink_backlog(&self, rnti: Rnti) -> u64 {
        self.uplink
            .get(&rnti)
            .map_or(0, |r| u64::from(r.buffered_bytes))
    }

    /// Drops the demand of one logical channel.
    /// 删除一个逻辑信道的需求。
    pub fn release_channel(&mut self, rnti: Rnti, lcid: u8) {
        if let Some(channels) = self.downlink.get_mut(&rnti) {
            channels.remove(&lcid);
        }
    }

    pub fn remove(&mut self, rnti: Rnti) {
        self.downlink.remove(&rnti);
        self.uplink.remove(&rnti);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_replace_instead_of_accumulating() {
        let mut tracker = DemandTracker::new();
        tracker.merge_downlink_report(Rnti(1), 3, 500, 0, 0);
        tracker.merge_downlink_report(Rnti(1), 3, 200, 0, 0);
        assert_eq!(tracker.channel(Rnti(1), 3).map(|c| c.new_bytes), Some(200));

        tracker.merge_uplink_report(Rnti(1), 1000, 10);
        tracker.merge_uplink_report(Rnti(1), 300, 0);
        assert_eq!(
            tracker.uplink(Rnti(1)),
            Some(UplinkDemand {
                buffered_bytes: 300,
                status_bytes: 0
            })
        );
    }

    #[test]
    fn test_consume_priority_status_then_retx_then_new() {
        let mut tracker = DemandTracker::new();
        tracker.merge_downlink_report(Rnti(1), 3, 100, 50, 20);

        // 20字节状态 + 2字节开销 + 50字节重传 + 10字节新数据
        tracker.consume(Rnti(1), 3, 82);
        assert_eq!(
            tracker.channel(Rnti(1), 3),
            Some(ChannelDemand {
                new_bytes: 90,
                retx_bytes: 0,
                status_bytes: 0
            })
        );
    }

    #[test]
    fn test_status_not_cleared_when_partially_covered() {
        let mut tracker = DemandTracker::new();
        tracker.merge_downlink_report(Rnti(1), 3, 0, 0, 40);
        tracker.consume(Rnti(1), 3, 30);
        assert_eq!(tracker.channel(Rnti(1), 3).map(|c| c.status_bytes), Some(40));
    }

    #[test]
    fn test_consume_full_pdu_reaches_exactly_zero() {
        let mut tracker = DemandTracker::new();
        for lcid in [1u8, 3] {
            tracker.merge_downlink_report(Rnti(9), lcid, 1234, 0, 17);
        }
        for pdu in tracker.downlink_pdus(Rnti(9)) {
            tracker.consume(Rnti(9), pdu.lcid, pdu.size - SUB_HEADER);
        }
        for lcid in [1u8, 3] {
            let channel = tracker.channel(Rnti(9), lcid);
            assert_eq!(channel, Some(ChannelDemand::default()));
        }
        // 再次扣减也不会变成负数
        tracker.consume(Rnti(9), 3, 5000);
        assert_eq!(tracker.channel(Rnti(9), 3), Some(ChannelDemand::default()));
    }

    #[test]
    fn test_consume_unknown_connection_is_ignored() {
        let mut tracker = DemandTracker::new();
        tracker.consume(Rnti(42), 3, 100);
        tracker.consume_uplink(Rnti(42), 100, true);
        assert_eq!(tracker.channel(Rnti(42), 3), None);
        assert_eq!(tracker.uplink(Rnti(42)), None);
    }

    #[test]
    fn test_pdus_ordered_by_kind() {
        let mut tracker = DemandTracker::new();
        tracker.merge_downlink_report(Rnti(1), 4, 100, 0, 0);
        tracker.merge_downlink_report(Rnti(1), 3, 0, 30, 5);
        let kinds: Vec<_> = tracker
            .downlink_pdus(Rnti(1))
            .into_iter()
            .map(|p| (p.lcid, p.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (3, PayloadKind::Status),
                (3, PayloadKind::Retransmission),
                (4, PayloadKind::NewData)
            ]
        );
        // 新数据PDU包含头部和余量
        let new_pdu = tracker.downlink_pdus(Rnti(1))[2];
        assert_eq!(new_pdu.size, 100 + RLC_HEADER + SUB_HEADER + 10);
    }

    #[test]
    fn test_uplink_status_cleared_only_when_carried() {
        let mut tracker = DemandTracker::new();
        tracker.merge_uplink_report(Rnti(2), 500, 30);
        tracker.consume_uplink(Rnti(2), 100, false);
        assert_eq!(
            tracker.uplink(Rnti(2)),
            Some(UplinkDemand {
                buffered_bytes: 402,
                status_bytes: 30
            })
        );
        tracker.consume_uplink(Rnti(2), 1000, true);
        assert_eq!(tracker.uplink(Rnti(2)), Some(UplinkDemand::default()));
        assert_eq!(tracker.uplink_request(Rnti(2)), None);
    }

    #[test]
    fn test_maximal_reports_saturate_pdu_sizes() {
        let mut tracker = DemandTracker::new();
        tracker.merge_downlink_report(Rnti(1), 3, u32::MAX, 0, u32::MAX);
        tracker.merge_uplink_report(Rnti(1), u32::MAX, 0);

        let pdus = tracker.downlink_pdus(Rnti(1));
        assert_eq!(pdus.len(), 2);
        assert!(pdus.iter().all(|p| p.size == u32::MAX));
        assert_eq!(tracker.uplink_request(Rnti(1)).map(|r| r.size), Some(u32::MAX));
    }
}
