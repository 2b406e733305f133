//! 定义了调度器中所有可能的错误类型。
//! Defines all possible error types of the scheduler.
//!
//! Only configuration-class failures are represented here. Transient resource
//! exhaustion, stale references and attempt-budget exhaustion are handled
//! inside the component that detects them and never surface as an `Error`.
//!
//! 这里只表示配置类错误。瞬时资源耗尽、过期引用和重传次数耗尽都在检测到它们的
//! 组件内部处理，永远不会以 `Error` 的形式出现。

use crate::identity::{Imsi, Rnti};
use thiserror::Error;

/// The primary error type for the scheduler library.
/// 调度器库的主要错误类型。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// An operation referenced a connection that was never configured.
    /// 操作引用了一个从未配置过的连接。
    #[error("connection {0} is not configured")]
    UnknownConnection(Rnti),

    /// A HARQ process id outside of `[0, num_processes)` was referenced.
    /// 引用了超出 `[0, num_processes)` 范围的HARQ进程ID。
    #[error("HARQ process {process} out of range for connection {rnti}")]
    HarqProcessOutOfRange { rnti: Rnti, process: u8 },

    /// A busy notification overlapped symbols already marked busy.
    /// 忙碌通知与已标记为忙碌的符号重叠。
    #[error("symbol {symbol} of subframe {subframe} is already busy")]
    BusyOverlap { subframe: u8, symbol: usize },

    /// A symbol range does not fit inside the subframe.
    /// 符号范围超出了子帧。
    #[error("symbol range {start}+{len} exceeds {total} symbols")]
    InvalidSymbolRange {
        start: usize,
        len: usize,
        total: usize,
    },

    /// A relay was registered under a parent the topology does not know.
    /// 中继节点注册在一个拓扑未知的父节点下。
    #[error("parent node {0} is not part of the topology")]
    UnknownParent(Imsi),

    /// A relay was registered twice.
    /// 中继节点被重复注册。
    #[error("node {0} is already part of the topology")]
    DuplicateNode(Imsi),

    /// A node was addressed that the runtime has no handle for.
    /// 运行时中没有该节点的句柄。
    #[error("node {0} is not registered with the runtime")]
    UnknownNode(Imsi),

    /// The configuration is inconsistent.
    /// 配置不一致。
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("Internal channel is broken")]
    ChannelClosed,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
