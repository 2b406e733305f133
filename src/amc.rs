//! 自适应调制编码：质量指示到MCS的映射，以及传输块大小模型。
//! Adaptive modulation and coding: indicator to MCS mapping and the
//! transport-block sizing model.

use crate::config::FrameConfig;
use std::fmt::Debug;

/// Highest modulation and coding scheme index.
/// 最高的调制编码方案索引。
pub const MAX_MCS: u8 = 28;

/// Highest channel quality indicator.
/// 最高的信道质量指示。
pub const MAX_CQI: u8 = 15;

const CRC_BITS: u64 = 24;
const TARGET_BER: f64 = 0.00005;

const SPECTRAL_EFFICIENCY_FOR_CQI: [f64; 16] = [
    0.0, // out of range
    0.15, 0.23, 0.38, 0.6, 0.88, 1.18, 1.48, 1.91, 2.41, 2.73, 3.32, 3.9, 4.52, 5.12, 5.55,
];

const SPECTRAL_EFFICIENCY_FOR_MCS: [f64; 29] = [
    0.15, 0.19, 0.23, 0.31, 0.38, 0.49, 0.6, 0.74, 0.88, 1.03, 1.18, 1.33, 1.48, 1.7, 1.91, 2.16,
    2.41, 2.57, 2.73, 3.03, 3.32, 3.61, 3.9, 4.21, 4.52, 4.82, 5.12, 5.33, 5.55,
];

/// Maps a wideband CQI to the highest MCS whose efficiency it supports.
/// 将宽带CQI映射到其支持的最高MCS。
pub fn mcs_from_cqi(cqi: u8) -> u8 {
    let efficiency = SPECTRAL_EFFICIENCY_FOR_CQI[usize::from(cqi.min(MAX_CQI))];
    let mut mcs = 0u8;
    while mcs < MAX_MCS && SPECTRAL_EFFICIENCY_FOR_MCS[usize::from(mcs) + 1] <= efficiency {
        mcs += 1;
    }
    mcs
}

/// Maps an effective SINR in dB to a CQI using a Shannon bound with a BER gap.
/// 使用带误码率间隙的香农界将有效SINR（dB）映射为CQI。
pub fn cqi_from_sinr_db(sinr_db: f64) -> u8 {
    let sinr = 10f64.powf(sinr_db / 10.0);
    let gap = -(5.0 * TARGET_BER).ln() / 1.5;
    let efficiency = (1.0 + sinr / gap).log2();
    let mut cqi = 0u8;
    while cqi < MAX_CQI && SPECTRAL_EFFICIENCY_FOR_CQI[usize::from(cqi) + 1] <= efficiency {
        cqi += 1;
    }
    cqi
}

/// Capacity model of a grant: bytes carried by `symbols` symbols at `mcs`.
///
/// Implementations must be monotonic non-decreasing in `symbols`.
///
/// 授权的容量模型：以 `mcs` 在 `symbols` 个符号上承载的字节数。
/// 实现必须对 `symbols` 单调不减。
pub trait TransportBlockModel: Debug + Send + Sync {
    fn tb_size_bytes(&self, mcs: u8, symbols: usize) -> u32;
}

/// Table-driven model over a single wideband resource.
/// 单一宽带资源上的查表模型。
#[derive(Debug, Clone, Copy)]
pub struct AmcTable {
    subcarriers_per_symbol: u32,
}

impl AmcTable {
    pub fn new(subcarriers_per_symbol: u32) -> Self {
        Self {
            subcarriers_per_symbol,
        }
    }

    pub fn from_frame(frame: &FrameConfig) -> Self {
        Self::new(frame.subcarriers_per_symbol)
    }
}

impl TransportBlockModel for AmcTable {
    fn tb_size_bytes(&self, mcs: u8, symbols: usize) -> u32 {
        let efficiency = SPECTRAL_EFFICIENCY_FOR_MCS[usize::from(mcs.min(MAX_MCS))];
        let resource_elements = u64::from(self.subcarriers_per_symbol) * symbols as u64;
        let bits = (resource_elements as f64 * efficiency).floor() as u64;
        let payload_bytes = bits.saturating_sub(CRC_BITS) / 8;
        u32::try_from(payload_bytes).unwrap_or(u32::MAX)
    }
}

/// Outcome of sizing a byte demand in symbols.
/// 将字节需求换算为符号数的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRequirement {
    pub symbols: usize,
    pub tb_size: u32,
}

/// Finds the smallest `n` in `[0, max_symbols]` with `tb_size_bytes(mcs, n) >= bytes`.
///
/// Bisection is used since the model has no closed-form inverse. When even
/// `max_symbols` cannot carry `bytes`, `max_symbols` is returned.
///
/// 在 `[0, max_symbols]` 中查找满足 `tb_size_bytes(mcs, n) >= bytes` 的最小 `n`。
/// 由于模型没有闭式逆函数，这里使用二分法。若 `max_symbols` 也无法承载，则返回 `max_symbols`。
pub fn min_symbols_for(
    model: &dyn TransportBlockModel,
    mcs: u8,
    bytes: u32,
    max_symbols: usize,
) -> SymbolRequirement {
    if bytes == 0 {
        return SymbolRequirement {
            symbols: 0,
            tb_size: model.tb_size_bytes(mcs, 0),
        };
    }
    let full = model.tb_size_bytes(mcs, max_symbols);
    if full < bytes {
        return SymbolRequirement {
            symbols: max_symbols,
            tb_size: full,
        };
    }
    // 不变式: S(lo) < bytes <= S(hi)
    let mut lo = 0usize;
    let mut hi = max_symbols;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if model.tb_size_bytes(mcs, mid) >= bytes {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    SymbolRequirement {
        symbols: hi,
        tb_size: model.tb_size_bytes(mcs, hi),
    }
}
