//! Link-Quality Tracker
//!
//! Holds the latest channel-quality indicator per connection and direction
//! together with a validity countdown, and translates indicators into a
//! modulation and coding choice.
//!
//! 链路质量跟踪器
//!
//! 按连接和方向保存最新的信道质量指示及其有效期倒计时，并将指示转换为调制编码选择。

use crate::{
    amc::{cqi_from_sinr_db, mcs_from_cqi},
    config::LinkQualityConfig,
    identity::{Direction, Rnti},
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// CQI assumed for a freshly configured downlink.
/// 新配置下行链路假定的CQI。
pub const DEFAULT_DL_CQI: u8 = 1;

/// A channel-quality report.
/// 信道质量报告。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indicator {
    /// Wideband CQI, 0 meaning out of range.
    /// 宽带CQI，0表示超出范围。
    Cqi(u8),
    /// Effective SINR in dB.
    /// 有效SINR（dB）。
    SinrDb(f64),
}

/// A quality report for one connection and direction.
/// 某连接某方向的质量报告。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    pub rnti: Rnti,
    pub direction: Direction,
    pub indicator: Indicator,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    indicator: Indicator,
    remaining: u32,
}

/// Per-direction quality store with expiry.
/// 带过期机制的按方向质量存储。
#[derive(Debug)]
pub struct LinkQualityTracker {
    validity_intervals: u32,
    fixed_mcs_dl: Option<u8>,
    fixed_mcs_ul: Option<u8>,
    downlink: BTreeMap<Rnti, Entry>,
    uplink: BTreeMap<Rnti, Entry>,
}

impl LinkQualityTracker {
    /// Creates a new tracker.
    /// 创建新的跟踪器。
    pub fn new(config: &LinkQualityConfig) -> Self {
        Self {
            validity_intervals: config.validity_intervals,
            fixed_mcs_dl: config.fixed_mcs_dl,
            fixed_mcs_ul: config.fixed_mcs_ul,
            downlink: BTreeMap::new(),
            uplink: BTreeMap::new(),
        }
    }

    fn table(&mut self, direction: Direction) -> &mut BTreeMap<Rnti, Entry> {
        match direction {
            Direction::Downlink => &mut self.downlink,
            Direction::Uplink => &mut self.uplink,
        }
    }

    /// Stores an indicator and restarts its validity countdown.
    /// 保存指示并重新开始其有效期倒计时。
    pub fn record(&mut self, rnti: Rnti, direction: Direction, indicator: Indicator) {
        let remaining = self.validity_intervals;
        trace!(%rnti, ?direction, ?indicator, "Recording link quality");
        self.table(direction).insert(
            rnti,
            Entry {
                indicator,
                remaining,
            },
        );
    }

    /// Advances every countdown by one interval and evicts expired entries.
    /// Returns the evicted entries.
    ///
    /// 将所有倒计时推进一个间隔并移除过期条目，返回被移除的条目。
    pub fn decay(&mut self) -> Vec<(Rnti, Direction)> {
        let mut evicted = Vec::new();
        for direction in [Direction::Downlink, Direction::Uplink] {
            self.table(direction).retain(|rnti, entry| {
                entry.remaining = entry.remaining.saturating_sub(1);
                if entry.remaining == 0 {
                    evicted.push((*rnti, direction));
                    false
                } else {
                    true
                }
            });
        }
        for (rnti, direction) in &evicted {
            debug!(%rnti, ?direction, "Link quality expired");
        }
        evicted
    }

    /// Latest valid indicator, if any.
    /// 最新的有效指示（若存在）。
    pub fn get(&self, rnti: Rnti, direction: Direction) -> Option<Indicator> {
        let table = match direction {
            Direction::Downlink => &self.downlink,
            Direction::Uplink => &self.uplink,
        };
        table.get(&rnti).map(|e| e.indicator)
    }

    /// Deterministic indicator → MCS lookup. `None` means the link is out of range.
    /// 确定性的指示 → MCS 查找。`None` 表示链路超出范围。
    pub fn to_coding_scheme(indicator: Indicator) -> Option<u8> {
        let cqi = match indicator {
            Indicator::Cqi(cqi) => cqi,
            Indicator::SinrDb(sinr) => cqi_from_sinr_db(sinr),
        };
        if cqi == 0 { None } else { Some(mcs_from_cqi(cqi)) }
    }

    /// MCS the allocator should use for a connection in one direction.
    ///
    /// Fixed overrides win. Without a valid report the downlink falls back to
    /// the default CQI and the uplink to MCS 0.
    ///
    /// 分配器对某连接某方向应使用的MCS。固定配置优先；没有有效报告时，下行回退到默认CQI，
    /// 上行回退到MCS 0。
    pub fn coding_scheme(&self, rnti: Rnti, direction: Direction) -> Option<u8> {
        let fixed = match direction {
            Direction::Downlink => self.fixed_mcs_dl,
            Direction::Uplink => self.fixed_mcs_ul,
        };
        if let Some(mcs) = fixed {
            return Some(mcs);
        }
        match (self.get(rnti, direction), direction) {
            (Some(indicator), _) => Self::to_coding_scheme(indicator),
            (None, Direction::Downlink) => Self::to_coding_scheme(Indicator::Cqi(DEFAULT_DL_CQI)),
            (None, Direction::Uplink) => Some(0),
        }
    }

    /// Seeds the default downlink quality for a new connection.
    /// 为新连接设置默认的下行质量。
    pub fn on_connection_configured(&mut self, rnti: Rnti) {
        if !self.downlink.contains_key(&rnti) {
            self.record(rnti, Direction::Downlink, Indicator::Cqi(DEFAULT_DL_CQI));
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

    fn create_test_tracker(validity: u32) -> LinkQualityTracker {
        LinkQualityTracker::new(&LinkQualityConfig {
            validity_intervals: validity,
            ..Default::default()
        })
    }

    #[test]
    fn test_record_and_decay_evicts_after_threshold() {
        let mut tracker = create_test_tracker(3);
        tracker.record(Rnti(1), Direction::Downlink, Indicator::Cqi(9));

        assert!(tracker.decay().is_empty());
        assert!(tracker.decay().is_empty());
        // 第三次衰减时过期
        assert_eq!(tracker.decay(), vec![(Rnti(1), Direction::Downlink)]);
        assert_eq!(tracker.get(Rnti(1), Direction::Downlink), None);
    }

    #[test]
    fn test_record_resets_countdown() {
        let mut tracker = create_test_tracker(2);
        tracker.record(Rnti(1), Direction::Uplink, Indicator::SinrDb(10.0));
        tracker.decay();
        tracker.record(Rnti(1), Direction::Uplink, Indicator::SinrDb(12.0));
        assert!(tracker.decay().is_empty());
        assert_eq!(
            tracker.get(Rnti(1), Direction::Uplink),
            Some(Indicator::SinrDb(12.0))
        );
    }

    #[test]
    fn test_cqi_zero_is_out_of_range() {
        assert_eq!(LinkQualityTracker::to_coding_scheme(Indicator::Cqi(0)), None);
        assert_eq!(
            LinkQualityTracker::to_coding_scheme(Indicator::Cqi(15)),
            Some(crate::amc::MAX_MCS)
        );
    }

    #[test]
    fn test_fallback_when_no_quality_known() {
        let tracker = create_test_tracker(10);
        assert_eq!(tracker.coding_scheme(Rnti(4), Direction::Downlink), Some(0));
        assert_eq!(tracker.coding_scheme(Rnti(4), Direction::Uplink), Some(0));
    }

    #[test]
    fn test_fixed_mcs_overrides_reports() {
        let mut tracker = LinkQualityTracker::new(&LinkQualityConfig {
            fixed_mcs_dl: Some(5),
            ..Default::default()
        });
        tracker.record(Rnti(1), Direction::Downlink, Indicator::Cqi(0));
        assert_eq!(tracker.coding_scheme(Rnti(1), Direction::Downlink), Some(5));
    }
}
