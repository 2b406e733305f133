//! 测试辅助工具模块
//! Test utilities module
//!
//! Seeded random workloads for driving schedulers in tests and simulations.
//! The same seed always yields the same sequence of reports.
//!
//! 用于在测试和仿真中驱动调度器的可复现随机负载。相同的种子总是产生相同的报告序列。

use crate::{
    config::FrameConfig,
    identity::{ConnectionInfo, Direction, Imsi, Rnti, SfnSf},
    sched::{
        BusyNotification, DlBufferReport, Feedback, HarqFeedback, Indicator, NodeScheduler,
        QualityReport, SubframeAllocation, UlBufferReport,
    },
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Shape of a random workload.
/// 随机负载的形态。
#[derive(Debug, Clone)]
pub struct TrafficProfile {
    /// Probability that a connection reports new demand in an interval.
    /// 某连接在一个间隔内上报新需求的概率。
    pub activity: f64,
    pub max_dl_bytes: u32,
    pub max_ul_bytes: u32,
    /// Probability that a report carries a status PDU.
    /// 报告携带状态PDU的概率。
    pub status_probability: f64,
    /// Probability that a quality report is sent in an interval.
    /// 一个间隔内发送质量报告的概率。
    pub quality_probability: f64,
    pub nack_probability: f64,
    /// Probability that the co-located role claims symbols in an interval.
    /// 同址角色在一个间隔内占用符号的概率。
    pub busy_probability: f64,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self {
            activity: 0.5,
            max_dl_bytes: 4000,
            max_ul_bytes: 2000,
            status_probability: 0.1,
            quality_probability: 0.2,
            nack_probability: 0.1,
            busy_probability: 0.2,
        }
    }
}

/// Seeded generator of reports, feedback and busy notifications.
/// 基于种子的报告、反馈与忙碌通知生成器。
#[derive(Debug)]
pub struct TrafficGenerator {
    rng: StdRng,
    profile: TrafficProfile,
}

impl TrafficGenerator {
    pub fn new(seed: u64) -> Self {
        Self::with_profile(seed, TrafficProfile::default())
    }

    pub fn with_profile(seed: u64, profile: TrafficProfile) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            profile,
        }
    }

    /// `count` connections with RNTIs from 1 and IMSIs from `first_imsi`.
    /// Each is a relay with probability `relay_probability`.
    ///
    /// 生成 `count` 个连接，RNTI从1开始，IMSI从 `first_imsi` 开始；每个连接以
    /// `relay_probability` 的概率为中继。
    pub fn connections(&mut self, count: u16, first_imsi: u64, relay_probability: f64) -> Vec<ConnectionInfo> {
        (1..=count)
            .map(|i| ConnectionInfo {
                rnti: Rnti(i),
                imsi: Imsi(first_imsi + u64::from(i)),
                relay: self.rng.random_bool(relay_probability),
            })
            .collect()
    }

    fn status_bytes(&mut self) -> u32 {
        if self.rng.random_bool(self.profile.status_probability) {
            self.rng.random_range(1..=40)
        } else {
            0
        }
    }

    pub fn dl_report(&mut self, rnti: Rnti) -> Option<DlBufferReport> {
        if !self.rng.random_bool(self.profile.activity) {
            return None;
        }
        let new_bytes = self.rng.random_range(0..=self.profile.max_dl_bytes);
        let retx_bytes = if self.rng.random_bool(0.1) {
            self.rng.random_range(0..=new_bytes / 4)
        } else {
            0
        };
        Some(DlBufferReport {
            rnti,
            lcid: self.rng.random_range(1..=4),
            new_bytes,
            retx_bytes,
            status_bytes: self.status_bytes(),
        })
    }

    pub fn ul_report(&mut self, rnti: Rnti) -> Option<UlBufferReport> {
        if !self.rng.random_bool(self.profile.activity) {
            return None;
        }
        Some(UlBufferReport {
            rnti,
            buffered_bytes: self.rng.random_range(0..=self.profile.max_ul_bytes),
            status_bytes: self.status_bytes(),
        })
    }

    /// Downlink reports carry CQI, uplink reports carry SINR.
    /// 下行报告携带CQI，上行报告携带SINR。
    pub fn quality_report(&mut self, rnti: Rnti, direction: Direction) -> Option<QualityReport> {
        if !self.rng.random_bool(self.profile.quality_probability) {
            return None;
        }
        let indicator = match direction {
            Direction::Downlink => Indicator::Cqi(self.rng.random_range(0..=15)),
            Direction::Uplink => Indicator::SinrDb(self.rng.random_range(-10.0..30.0)),
        };
        Some(QualityReport {
            rnti,
            direction,
            indicator,
        })
    }

    /// One random busy range inside the data region, if any.
    /// 数据区域内的一个随机忙碌区间（若有）。
    pub fn busy(&mut self, sfn: SfnSf, frame: &FrameConfig) -> Option<BusyNotification> {
        if !self.rng.random_bool(self.profile.busy_probability) {
            return None;
        }
        let start = self.rng.random_range(frame.data_start()..frame.data_end());
        let len = self.rng.random_range(1..=frame.data_end() - start);
        Some(BusyNotification { sfn, start, len })
    }

    /// ACK or NACK for every data grant of an allocation.
    /// 为分配中的每个数据授权生成ACK或NACK。
    pub fn feedback(&mut self, allocation: &SubframeAllocation) -> Vec<HarqFeedback> {
        let mut feedback = Vec::new();
        for grant in allocation.data_grants() {
            let (Some(rnti), Some(process)) = (grant.rnti, grant.harq_process) else {
                continue;
            };
            let nack = self.rng.random_bool(self.profile.nack_probability);
            feedback.push(HarqFeedback {
                rnti,
                direction: grant.direction,
                process,
                feedback: if nack { Feedback::Nack } else { Feedback::Ack },
            });
        }
        feedback
    }

    /// Feeds one interval's worth of random reports and busy symbols into `scheduler`.
    /// 向 `scheduler` 注入一个间隔的随机报告与忙碌符号。
    pub fn drive(&mut self, scheduler: &mut NodeScheduler, sfn: SfnSf) {
        let rntis: Vec<Rnti> = scheduler.directory().iter().map(|c| c.rnti).collect();
        for rnti in rntis {
            if let Some(report) = self.dl_report(rnti) {
                scheduler.on_dl_buffer_report(report);
            }
            if let Some(report) = self.ul_report(rnti) {
                scheduler.on_ul_buffer_report(report);
            }
            for direction in [Direction::Downlink, Direction::Uplink] {
                if let Some(report) = self.quality_report(rnti, direction) {
                    scheduler.on_quality_report(report);
                }
            }
        }
        let frame = scheduler.config().frame.clone();
        if let Some(busy) = self.busy(sfn, &frame) {
            // 每个间隔只生成一个区间，不会与自身重叠
            let _ = scheduler.on_busy_notification(busy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_workload() {
        let mut a = TrafficGenerator::new(42);
        let mut b = TrafficGenerator::new(42);
        for i in 0..50 {
            assert_eq!(a.dl_report(Rnti(i)), b.dl_report(Rnti(i)));
            assert_eq!(a.ul_report(Rnti(i)), b.ul_report(Rnti(i)));
        }
    }

    #[test]
    fn test_busy_ranges_stay_in_data_region() {
        let frame = FrameConfig::default();
        let profile = TrafficProfile {
            busy_probability: 1.0,
            ..Default::default()
        };
        let mut generator = TrafficGenerator::with_profile(7, profile);
        for _ in 0..200 {
            let busy = generator.busy(SfnSf::new(0, 0), &frame).unwrap();
            assert!(busy.start >= frame.data_start());
            assert!(busy.start + busy.len <= frame.data_end());
            assert!(busy.len >= 1);
        }
    }
}
