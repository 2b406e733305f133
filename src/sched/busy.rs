//! Busy-Resource Coordinator
//!
//! A relay shares one radio between its access role (this scheduler) and its
//! backhaul role (the co-located complementary scheduler). Symbols claimed by
//! the backhaul role are recorded here per interval and handed to the
//! allocator exactly once.
//!
//! 忙碌资源协调器
//!
//! 中继节点的接入角色（本调度器）与回传角色（同址的互补调度器）共享同一射频。
//! 回传角色占用的符号按间隔记录在这里，并且只交给分配器一次。

use crate::{
    error::{Error, Result},
    identity::SfnSf,
};
use std::ops::Range;
use tracing::{debug, trace};

/// One flag per symbol of an interval.
/// 每个间隔中每个符号一个标志。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMask {
    bits: Vec<bool>,
}

impl SymbolMask {
    /// Creates a mask with every symbol free.
    /// 创建所有符号空闲的掩码。
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_set(&self, symbol: usize) -> bool {
        self.bits.get(symbol).copied().unwrap_or(true)
    }

    /// Marks a range as taken. Out-of-range indices are ignored.
    /// 将一个范围标记为占用，超出范围的索引会被忽略。
    pub fn set_range(&mut self, range: Range<usize>) {
        let end = range.end.min(self.bits.len());
        for bit in self.bits.iter_mut().take(end).skip(range.start) {
            *bit = true;
        }
    }

    pub fn count_set(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn count_set_in(&self, range: Range<usize>) -> usize {
        let end = range.end.min(self.bits.len());
        let start = range.start.min(end);
        self.bits[start..end].iter().filter(|b| **b).count()
    }

    /// Adds every symbol taken in `other`.
    /// 合并 `other` 中所有被占用的符号。
    pub fn union_with(&mut self, other: &SymbolMask) {
        for (bit, taken) in self.bits.iter_mut().zip(other.bits.iter()) {
            *bit |= *taken;
        }
    }
}

/// First maximal free run at or after `from` that is at least `min_len` long.
///
/// The returned range covers the whole free run, so it may be longer than
/// `min_len`. A zero `min_len` never matches.
///
/// 在 `from` 及之后查找长度至少为 `min_len` 的第一个最大空闲段。
/// 返回的范围覆盖整个空闲段，因此可能比 `min_len` 长。`min_len` 为零时永不匹配。
pub fn find_run(mask: &SymbolMask, from: usize, min_len: usize) -> Option<Range<usize>> {
    if min_len == 0 {
        return None;
    }
    let mut start = from;
    while start < mask.len() {
        if mask.is_set(start) {
            start += 1;
            continue;
        }
        let len = free_run_at(mask, start, usize::MAX);
        if len >= min_len {
            return Some(start..start + len);
        }
        start += len;
    }
    None
}

/// Number of consecutive free symbols starting at `start`, capped at `max_len`.
/// 从 `start` 开始连续空闲符号的数量，上限为 `max_len`。
pub fn free_run_at(mask: &SymbolMask, start: usize, max_len: usize) -> usize {
    (start..mask.len())
        .take(max_len)
        .take_while(|&s| !mask.is_set(s))
        .count()
}

#[derive(Debug, Clone)]
struct BusyEntry {
    frame: u32,
    mask: SymbolMask,
}

/// Busy notification from the co-located complementary role.
/// 来自同址互补角色的忙碌通知。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyNotification {
    pub sfn: SfnSf,
    pub start: usize,
    pub len: usize,
}

/// Per-subframe busy bitmaps with single consumption.
/// 按子帧保存、只能消费一次的忙碌位图。
#[derive(Debug)]
pub struct BusyResourceCoordinator {
    symbols_per_subframe: usize,
    entries: Vec<Option<BusyEntry>>,
}

impl BusyResourceCoordinator {
    pub fn new(symbols_per_subframe: usize, subframes_per_frame: u8) -> Self {
        Self {
            symbols_per_subframe,
            entries: vec![None; usize::from(subframes_per_frame)],
        }
    }

    /// Marks `len` symbols from `start` busy for an interval.
    ///
    /// Overlap with symbols already busy in the same interval is a programming
    /// error of the notifying role and is reported as `Error::BusyOverlap`.
    ///
    /// 将某间隔中从 `start` 起的 `len` 个符号标记为忙碌。与同一间隔中已忙碌的符号重叠
    /// 属于通知方的编程错误，以 `Error::BusyOverlap` 报告。
    pub fn mark_busy(&mut self, sfn: SfnSf, start: usize, len: usize) -> Result<()> {
        let total = self.symbols_per_subframe;
        if start + len > total {
            return Err(Error::InvalidSymbolRange { start, len, total });
        }
        let slot = self
            .entries
            .get_mut(usize::from(sfn.subframe))
            .ok_or(Error::InvalidConfig("subframe index beyond frame length"))?;

        if !matches!(slot, Some(entry) if entry.frame == sfn.frame) {
            *slot = None;
        }
        let entry = slot.get_or_insert_with(|| BusyEntry {
            frame: sfn.frame,
            mask: SymbolMask::new(total),
        });
        if let Some(symbol) = (start..start + len).find(|&s| entry.mask.is_set(s)) {
            return Err(Error::BusyOverlap {
                subframe: sfn.subframe,
                symbol,
            });
        }
        entry.mask.set_range(start..start + len);
        trace!(%sfn, start, len, "Symbols marked busy");
        Ok(())
    }

    /// Returns the busy bitmap of an interval and invalidates it.
    /// 返回某间隔的忙碌位图并使其失效。
    pub fn consume_and_clear(&mut self, sfn: SfnSf) -> SymbolMask {
        let empty = SymbolMask::new(self.symbols_per_subframe);
        let Some(slot) = self.entries.get_mut(usize::from(sfn.subframe)) else {
            return empty;
        };
        match slot.take() {
            Some(entry) if entry.frame == sfn.frame => {
                debug!(%sfn, busy = entry.mask.count_set(), "Consumed busy symbols");
                entry.mask
            }
            Some(entry) if entry.frame > sfn.frame => {
                // 属于未来帧，保留
                *slot = Some(entry);
                empty
            }
            _ => empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(pattern: &str) -> SymbolMask {
        let mut mask = SymbolMask::new(pattern.len());
        for (i, c) in pattern.chars().enumerate() {
            if c == '#' {
                mask.set_range(i..i + 1);
            }
        }
        mask
    }

    #[test]
    fn test_find_run_skips_short_gaps() {
        let mask = mask_from("#..#....#.");
        assert_eq!(find_run(&mask, 0, 1), Some(1..3));
        assert_eq!(find_run(&mask, 0, 3), Some(4..8));
        assert_eq!(find_run(&mask, 5, 3), Some(5..8));
        assert_eq!(find_run(&mask, 0, 5), None);
        assert_eq!(find_run(&mask, 9, 1), Some(9..10));
    }

    #[test]
    fn test_find_run_on_full_and_empty_masks() {
        assert_eq!(find_run(&mask_from("####"), 0, 1), None);
        assert_eq!(find_run(&mask_from("...."), 0, 4), Some(0..4));
        assert_eq!(find_run(&mask_from("...."), 0, 0), None);
        assert_eq!(find_run(&mask_from("...."), 7, 1), None);
    }

    #[test]
    fn test_free_run_at_stops_on_busy_symbol() {
        let mask = mask_from("##...#");
        assert_eq!(free_run_at(&mask, 2, 10), 3);
        assert_eq!(free_run_at(&mask, 2, 2), 2);
        assert_eq!(free_run_at(&mask, 0, 10), 0);
        assert_eq!(free_run_at(&mask, 5, 10), 0);
    }

    #[test]
    fn test_consume_and_clear_is_single_use() {
        let mut busy = BusyResourceCoordinator::new(24, 10);
        let sfn = SfnSf::new(5, 3);
        busy.mark_busy(sfn, 4, 6).unwrap();

        let first = busy.consume_and_clear(sfn);
        assert_eq!(first.count_set(), 6);
        assert!(first.is_set(4) && first.is_set(9) && !first.is_set(10));

        // 第二次消费得到空位图
        let second = busy.consume_and_clear(sfn);
        assert_eq!(second.count_set(), 0);
    }

    #[test]
    fn test_overlap_is_rejected() {
        let mut busy = BusyResourceCoordinator::new(24, 10);
        let sfn = SfnSf::new(1, 0);
        busy.mark_busy(sfn, 2, 4).unwrap();
        assert_eq!(
            busy.mark_busy(sfn, 5, 2),
            Err(Error::BusyOverlap {
                subframe: 0,
                symbol: 5
            })
        );
        busy.mark_busy(sfn, 6, 2).unwrap();
        assert_eq!(busy.consume_and_clear(sfn).count_set(), 6);
    }

    #[test]
    fn test_stale_frame_entry_is_replaced() {
        let mut busy = BusyResourceCoordinator::new(24, 10);
        busy.mark_busy(SfnSf::new(1, 2), 2, 4).unwrap();
        // 新帧的同一子帧覆盖旧条目，不算重叠
        busy.mark_busy(SfnSf::new(2, 2), 2, 4).unwrap();
        assert_eq!(busy.consume_and_clear(SfnSf::new(1, 2)).count_set(), 0);
    }

    #[test]
    fn test_future_entry_survives_consumption() {
        let mut busy = BusyResourceCoordinator::new(24, 10);
        busy.mark_busy(SfnSf::new(3, 1), 1, 1).unwrap();
        assert_eq!(busy.consume_and_clear(SfnSf::new(2, 1)).count_set(), 0);
        assert_eq!(busy.consume_and_clear(SfnSf::new(3, 1)).count_set(), 1);
    }

    #[test]
    fn test_out_of_frame_range_is_rejected() {
        let mut busy = BusyResourceCoordinator::new(24, 10);
        assert!(matches!(
            busy.mark_busy(SfnSf::new(0, 0), 20, 5),
            Err(Error::InvalidSymbolRange { .. })
        ));
    }
}
