//! 标识类型与本地/全局标识转换。
//! Identity types and the local/global identity translation boundary.
//!
//! 职责：
//! - 区分本地作用域的连接标识 (RNTI) 与全局唯一的用户标识 (IMSI)
//! - 提供唯一的 RNTI → IMSI 转换函数
//! - 定义调度间隔编号 (SfnSf)

use std::collections::BTreeMap;
use std::fmt;

/// A connection identifier, unique only within one node's scheduler.
/// 连接标识，仅在一个节点的调度器内唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rnti(pub u16);

/// A subscriber identifier, unique across the whole topology.
/// 用户标识，在整个拓扑中唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Imsi(pub u64);

impl Imsi {
    /// The identity of the wired gateway (donor) node.
    /// 有线网关（宿主）节点的标识。
    pub const DONOR: Imsi = Imsi(0);

    pub fn is_donor(self) -> bool {
        self == Self::DONOR
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rnti:{}", self.0)
    }
}

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "imsi:{}", self.0)
    }
}

/// Link direction.
/// 链路方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Downlink,
    Uplink,
}

/// Number of a scheduling interval: frame number plus subframe index.
/// 调度间隔编号：帧号加子帧索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SfnSf {
    pub frame: u32,
    pub subframe: u8,
}

impl SfnSf {
    pub fn new(frame: u32, subframe: u8) -> Self {
        Self { frame, subframe }
    }

    /// Returns the interval that follows this one.
    /// 返回下一个间隔。
    pub fn next(self, subframes_per_frame: u8) -> Self {
        if self.subframe + 1 >= subframes_per_frame {
            Self::new(self.frame.wrapping_add(1), 0)
        } else {
            Self::new(self.frame, self.subframe + 1)
        }
    }

    /// Linear interval count since frame 0, subframe 0.
    /// 从第0帧第0子帧起的线性间隔计数。
    pub fn index(self, subframes_per_frame: u8) -> u64 {
        u64::from(self.frame) * u64::from(subframes_per_frame) + u64::from(self.subframe)
    }
}

impl fmt::Display for SfnSf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.frame, self.subframe)
    }
}

/// Translates the locally-scoped connection identity into the network-wide one.
///
/// 将本地作用域的连接标识转换为全网标识。
pub trait ImsiResolver {
    /// Global identity behind a local connection, if known.
    /// 本地连接背后的全局标识（若已知）。
    fn imsi_of(&self, rnti: Rnti) -> Option<Imsi>;

    /// Local connection carrying a global identity, if any.
    /// 承载某全局标识的本地连接（若存在）。
    fn rnti_of(&self, imsi: Imsi) -> Option<Rnti>;
}

/// Attributes of one configured connection.
/// 一个已配置连接的属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub rnti: Rnti,
    pub imsi: Imsi,
    /// Whether the peer is a relay-class device.
    /// 对端是否为中继类设备。
    pub relay: bool,
}

/// Bidirectional RNTI ↔ IMSI table of one node.
///
/// 一个节点的 RNTI ↔ IMSI 双向表。
#[derive(Debug, Default, Clone)]
pub struct ConnectionDirectory {
    by_rnti: BTreeMap<Rnti, ConnectionInfo>,
    by_imsi: BTreeMap<Imsi, Rnti>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a connection. Returns the previous entry for the RNTI.
    /// 添加或替换连接，返回该RNTI之前的条目。
    pub fn insert(&mut self, info: ConnectionInfo) -> Option<ConnectionInfo> {
        let previous = self.by_rnti.insert(info.rnti, info);
        if let Some(old) = previous {
            self.by_imsi.remove(&old.imsi);
        }
        self.by_imsi.insert(info.imsi, info.rnti);
        previous
    }

    pub fn remove(&mut self, rnti: Rnti) -> Option<ConnectionInfo> {
        let removed = self.by_rnti.remove(&rnti)?;
        if self.by_imsi.get(&removed.imsi) == Some(&rnti) {
            self.by_imsi.remove(&removed.imsi);
        }
        Some(removed)
    }

    pub fn get(&self, rnti: Rnti) -> Option<&ConnectionInfo> {
        self.by_rnti.get(&rnti)
    }

    pub fn contains(&self, rnti: Rnti) -> bool {
        self.by_rnti.contains_key(&rnti)
    }

    pub fn is_relay(&self, rnti: Rnti) -> bool {
        self.by_rnti.get(&rnti).is_some_and(|c| c.relay)
    }

    /// Connections in ascending RNTI order.
    /// 按RNTI升序排列的连接。
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionInfo> {
        self.by_rnti.values()
    }

    pub fn len(&self) -> usize {
        self.by_rnti.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rnti.is_empty()
    }
}

impl ImsiResolver for ConnectionDirectory {
    fn imsi_of(&self, rnti: Rnti) -> Option<Imsi> {
        self.by_rnti.get(&rnti).map(|c| c.imsi)
    }

    fn rnti_of(&self, imsi: Imsi) -> Option<Rnti> {
        self.by_imsi.get(&imsi).copied()
    }
}
