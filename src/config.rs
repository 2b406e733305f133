//! 定义了调度器、中央协调器和运行时的可配置参数。
//! Defines configurable parameters for the schedulers, the central coordinator
//! and the runtime.

use crate::error::{Error, Result};
use std::time::Duration;

/// A structure containing all configurable parameters of the scheduler.
///
/// 包含调度器所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Frame structure parameters.
    /// 帧结构参数。
    pub frame: FrameConfig,

    /// HARQ-related parameters.
    /// HARQ相关参数。
    pub harq: HarqConfig,

    /// Channel quality tracking parameters.
    /// 信道质量跟踪参数。
    pub link_quality: LinkQualityConfig,

    /// Symbol allocation parameters.
    /// 符号分配参数。
    pub allocation: AllocationConfig,

    /// Central multi-hop coordination parameters.
    /// 中央多跳协调参数。
    pub coordinator: CoordinatorConfig,

    /// Interval driver parameters.
    /// 间隔驱动器参数。
    pub runtime: RuntimeConfig,
}

/// Frame structure parameters.
///
/// 帧结构参数。
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Number of OFDM symbols in one subframe, control symbols included.
    /// 一个子帧中的OFDM符号数量，包含控制符号。
    pub symbols_per_subframe: usize,
    /// Number of subframes in one frame.
    /// 一帧中的子帧数量。
    pub subframes_per_frame: u8,
    /// Leading symbols reserved for downlink control.
    /// 为下行控制保留的前导符号。
    pub dl_ctrl_symbols: usize,
    /// Trailing symbols reserved for uplink control.
    /// 为上行控制保留的尾部符号。
    pub ul_ctrl_symbols: usize,
    /// Resource elements carried by one symbol over the wideband resource.
    /// 一个符号在宽带资源上承载的资源单元数。
    pub subcarriers_per_symbol: u32,
}

/// HARQ-related parameters.
///
/// HARQ相关参数。
#[derive(Debug, Clone)]
pub struct HarqConfig {
    /// Whether retransmissions are tracked at all.
    /// 是否跟踪重传。
    pub enabled: bool,
    /// Number of HARQ processes per connection and direction.
    /// 每个连接每个方向的HARQ进程数。
    pub num_processes: u8,
    /// Intervals a process may wait for feedback before it is forced free.
    /// 进程在被强制释放前等待反馈的间隔数。
    pub feedback_timeout: u32,
}

/// Channel quality tracking parameters.
///
/// 信道质量跟踪参数。
#[derive(Debug, Clone)]
pub struct LinkQualityConfig {
    /// Intervals a quality report stays valid.
    /// 质量报告保持有效的间隔数。
    pub validity_intervals: u32,
    /// Forces a downlink MCS regardless of reported quality.
    /// 忽略报告的质量，强制使用下行MCS。
    pub fixed_mcs_dl: Option<u8>,
    /// Forces an uplink MCS regardless of reported quality.
    /// 忽略报告的质量，强制使用上行MCS。
    pub fixed_mcs_ul: Option<u8>,
}

/// Which link directions receive new-data grants.
///
/// 哪些链路方向获得新数据授权。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionMode {
    Both,
    DownlinkOnly,
    UplinkOnly,
}

/// Symbol allocation parameters.
///
/// 符号分配参数。
#[derive(Debug, Clone)]
pub struct AllocationConfig {
    /// Link directions that are scheduled.
    /// 被调度的链路方向。
    pub direction: DirectionMode,
    /// Relay connections get at most `available / relay_share_divisor` symbols.
    /// 中继连接最多获得 `available / relay_share_divisor` 个符号。
    pub relay_share_divisor: usize,
    /// Fraction of terminal downlink symbols moved to relay downlink flows.
    /// 从终端下行流转移到中继下行流的符号比例。
    pub relay_boost_eta: f64,
}

/// Weight rule used by the central coordinator.
///
/// 中央协调器使用的权重规则。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    MaxSumCapacity,
    MinMaxBuffer,
    Mrba,
}

/// Central multi-hop coordination parameters.
///
/// 中央多跳协调参数。
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Whether hints are computed and delivered.
    /// 是否计算并下发提示。
    pub enabled: bool,
    /// Weight rule.
    /// 权重规则。
    pub policy: PolicyKind,
    /// Intervals between two matching decisions.
    /// 两次匹配决策之间的间隔数。
    pub allocation_period: u32,
    /// Intervals between two summary refreshes.
    /// 两次汇总刷新之间的间隔数。
    pub info_collection_period: u32,
    /// Intervals a hint needs to travel one hop down the tree.
    /// 提示沿树下行一跳所需的间隔数。
    pub hop_delay: u32,
    /// Capacity assumed for an edge with no quality information, in bytes per interval.
    /// 无质量信息的边所假定的容量（每间隔字节数）。
    pub min_capacity: f64,
    /// Buffer weight of the MRBA rule.
    /// MRBA规则的缓冲区权重。
    pub mrba_eta: f64,
    /// Activation counter normalisation of the MRBA rule.
    /// MRBA规则的激活计数归一化值。
    pub mrba_mu_threshold: f64,
    /// Activation counter exponent of the MRBA rule.
    /// MRBA规则的激活计数指数。
    pub mrba_exponent: f64,
}

/// Interval driver parameters.
///
/// 间隔驱动器参数。
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Wall-clock length of one interval.
    /// 一个间隔的挂钟时长。
    pub interval_period: Duration,
    /// Time a node has to answer the summary exchange.
    /// 节点响应汇总交换的时限。
    pub exchange_deadline: Duration,
    /// Capacity of each node's command channel.
    /// 每个节点命令通道的容量。
    pub command_channel_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            symbols_per_subframe: 24,
            subframes_per_frame: 10,
            dl_ctrl_symbols: 1,
            ul_ctrl_symbols: 1,
            subcarriers_per_symbol: 864,
        }
    }
}

impl Default for HarqConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_processes: 20,
            feedback_timeout: 20,
        }
    }
}

impl Default for LinkQualityConfig {
    fn default() -> Self {
        Self {
            validity_intervals: 100,
            fixed_mcs_dl: None,
            fixed_mcs_ul: None,
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            direction: DirectionMode::Both,
            relay_share_divisor: 2,
            relay_boost_eta: 0.0,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: PolicyKind::MaxSumCapacity,
            allocation_period: 1,
            info_collection_period: 1,
            hop_delay: 0,
            min_capacity: 1.0,
            mrba_eta: 1.0,
            mrba_mu_threshold: 10.0,
            mrba_exponent: 1.0,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interval_period: Duration::from_millis(1),
            exchange_deadline: Duration::from_micros(200),
            command_channel_capacity: 1024,
        }
    }
}

impl FrameConfig {
    /// Number of symbols left for data once control symbols are reserved.
    /// 预留控制符号后剩余的数据符号数。
    pub fn data_symbols(&self) -> usize {
        self.symbols_per_subframe
            .saturating_sub(self.dl_ctrl_symbols + self.ul_ctrl_symbols)
    }

    /// First symbol of the data region.
    /// 数据区域的第一个符号。
    pub fn data_start(&self) -> usize {
        self.dl_ctrl_symbols
    }

    /// One past the last symbol of the data region.
    /// 数据区域最后一个符号之后的位置。
    pub fn data_end(&self) -> usize {
        self.symbols_per_subframe.saturating_sub(self.ul_ctrl_symbols)
    }
}

impl Config {
    /// Checks the configuration for values the scheduler cannot work with.
    /// 检查调度器无法处理的配置值。
    pub fn validate(&self) -> Result<()> {
        if self.frame.symbols_per_subframe == 0 {
            return Err(Error::InvalidConfig("symbols_per_subframe must be positive"));
        }
        if self.frame.dl_ctrl_symbols + self.frame.ul_ctrl_symbols >= self.frame.symbols_per_subframe {
            return Err(Error::InvalidConfig("control symbols leave no data region"));
        }
        if self.frame.subframes_per_frame == 0 {
            return Err(Error::InvalidConfig("subframes_per_frame must be positive"));
        }
        if self.harq.num_processes == 0 {
            return Err(Error::InvalidConfig("num_processes must be positive"));
        }
        if self.allocation.relay_share_divisor == 0 {
            return Err(Error::InvalidConfig("relay_share_divisor must be positive"));
        }
        if !(0.0..=1.0).contains(&self.allocation.relay_boost_eta) {
            return Err(Error::InvalidConfig("relay_boost_eta must lie in [0, 1]"));
        }
        if self.coordinator.allocation_period == 0 || self.coordinator.info_collection_period == 0 {
            return Err(Error::InvalidConfig("coordination periods must be positive"));
        }
        if self.coordinator.mrba_mu_threshold <= 0.0 {
            return Err(Error::InvalidConfig("mrba_mu_threshold must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        // 24个符号，首尾各一个控制符号
        assert_eq!(config.frame.data_symbols(), 22);
        assert_eq!(config.frame.data_start(), 1);
        assert_eq!(config.frame.data_end(), 23);
    }

    #[test]
    fn test_control_symbols_must_leave_data_region() {
        let mut config = Config::default();
        config.frame.symbols_per_subframe = 2;
        assert_eq!(
            config.validate(),
            Err(Error::InvalidConfig("control symbols leave no data region"))
        );
    }

    #[test]
    fn test_relay_boost_eta_bounds() {
        let mut config = Config::default();
        config.allocation.relay_boost_eta = 1.5;
        assert!(config.validate().is_err());
    }
}
