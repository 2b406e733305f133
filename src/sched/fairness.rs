//! 公平划分与中继份额限制。
//! Fair division of symbols among flows and the relay share cap.
//!
//! These are pure functions over symbol counts. The allocator feeds them
//! requests already ordered by its round-robin rotation.
//!
//! 这些是作用于符号数的纯函数。分配器传入的请求已按轮询顺序排列。

/// Divides `available` symbols among `requests` by water-filling.
///
/// Each round gives every unmet flow up to an even share of what is left,
/// capped at its remaining deficit. Surplus from satisfied flows flows back
/// into the next round. Leftover single symbols go to the earliest flows.
///
/// 通过注水法将 `available` 个符号分配给 `requests`。每一轮为每个未满足的流分配剩余符号的
/// 均分份额（不超过其剩余缺口）；满足流的盈余进入下一轮，剩余的单个符号分给排在前面的流。
pub fn divide_fairly(requests: &[usize], available: usize) -> Vec<usize> {
    let mut shares = vec![0usize; requests.len()];
    let total_requested: usize = requests.iter().sum();
    let mut remaining = available.min(total_requested);

    while remaining > 0 {
        let unmet = requests
            .iter()
            .zip(shares.iter())
            .filter(|(req, got)| got < req)
            .count();
        if unmet == 0 {
            break;
        }
        let per_flow = (remaining / unmet).max(1);
        let mut progressed = false;
        for (share, &request) in shares.iter_mut().zip(requests.iter()) {
            if remaining == 0 {
                break;
            }
            let deficit = request - *share;
            if deficit == 0 {
                continue;
            }
            let give = per_flow.min(deficit).min(remaining);
            *share += give;
            remaining -= give;
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
    shares
}

/// Scales a relay's downlink and uplink requests down to `cap` symbols.
///
/// Requests above the cap are scaled by `cap / (dl + ul)` with floor rounding
/// and a minimum of one symbol per nonzero request. If the floor of one still
/// overshoots, the larger request is trimmed first, uplink on ties.
///
/// 将中继的下行和上行请求缩减到 `cap` 个符号以内。超出上限的请求按 `cap / (dl + ul)`
/// 向下取整缩放，每个非零请求至少一个符号；若仍超出，则先削减较大的请求，相等时先削减上行。
pub fn cap_relay_request(dl: usize, ul: usize, cap: usize) -> (usize, usize) {
    let total = dl + ul;
    if total <= cap {
        return (dl, ul);
    }
    if cap == 0 {
        return (0, 0);
    }
    let scale = |req: usize| {
        if req == 0 { 0 } else { (req * cap / total).max(1) }
    };
    let (mut dl, mut ul) = (scale(dl), scale(ul));
    while dl + ul > cap {
        if dl > ul {
            dl -= 1;
        } else {
            ul -= 1;
        }
    }
    (dl, ul)
}

/// Moves `floor(eta * donated)` symbols from donor flows to receiver flows.
///
/// `donors` index terminal downlink flows. `receivers` pairs a relay downlink
/// flow index with the headroom it has left under the relay cap. Receivers never
/// get more than their unmet request or their headroom. Symbols are taken one at
/// a time from the donor holding the most. Returns the number of symbols moved.
///
/// 将 `floor(eta * donated)` 个符号从捐出流转移到接收流。`donors` 为终端下行流的索引；
/// `receivers` 为中继下行流索引及其在中继上限下的剩余空间。接收方获得的符号不超过其未满足
/// 请求或剩余空间；每次从持有最多符号的捐出流中取一个。返回转移的符号数。
pub fn shift_to_relays(
    shares: &mut [usize],
    requests: &[usize],
    donors: &[usize],
    receivers: &[(usize, usize)],
    eta: f64,
) -> usize {
    let donated: usize = donors.iter().map(|&i| shares[i]).sum();
    let mut budget = (eta * donated as f64).floor() as usize;
    let mut moved = 0;

    for &(receiver, headroom) in receivers {
        let wanted = requests[receiver]
            .saturating_sub(shares[receiver])
            .min(headroom);
        let mut taken = 0;
        while taken < wanted && budget > 0 {
            let Some(&donor) = donors
                .iter()
                .filter(|&&d| shares[d] > 0)
                .max_by_key(|&&d| shares[d])
            else {
                budget = 0;
                break;
            };
            shares[donor] -= 1;
            taken += 1;
            budget -= 1;
        }
        shares[receiver] += taken;
        moved += taken;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_flows_over_eight_symbols_split_evenly() {
        assert_eq!(divide_fairly(&[10, 10], 8), vec![4, 4]);
    }

    #[test]
    fn test_split_is_order_independent_for_equal_requests() {
        let forward = divide_fairly(&[10, 10], 8);
        let mut reversed = divide_fairly(&[10, 10], 8);
        reversed.reverse();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_surplus_is_redistributed() {
        // 第一个流只需要2个符号，剩余的分给其余流
        assert_eq!(divide_fairly(&[2, 10, 10], 12), vec![2, 5, 5]);
        assert_eq!(divide_fairly(&[1, 3], 20), vec![1, 3]);
    }

    #[test]
    fn test_leftover_symbol_goes_to_earliest_flow() {
        assert_eq!(divide_fairly(&[10, 10, 10], 8), vec![3, 3, 2]);
        assert_eq!(divide_fairly(&[5, 5], 0), vec![0, 0]);
        assert!(divide_fairly(&[], 8).is_empty());
    }

    #[test]
    fn test_division_never_exceeds_available_or_requests() {
        let requests = [7, 1, 0, 13, 4];
        for available in 0..30 {
            let shares = divide_fairly(&requests, available);
            assert!(shares.iter().sum::<usize>() <= available);
            assert!(shares.iter().zip(requests.iter()).all(|(s, r)| s <= r));
        }
    }

    #[test]
    fn test_relay_cap_scales_proportionally() {
        assert_eq!(cap_relay_request(6, 2, 11), (6, 2));
        assert_eq!(cap_relay_request(12, 4, 8), (6, 2));
        assert_eq!(cap_relay_request(20, 1, 4), (3, 1));
        assert_eq!(cap_relay_request(5, 5, 1), (1, 0));
        assert_eq!(cap_relay_request(5, 5, 0), (0, 0));
    }

    #[test]
    fn test_relay_cap_is_never_exceeded() {
        for dl in 0..12 {
            for ul in 0..12 {
                for cap in 0..12 {
                    let (d, u) = cap_relay_request(dl, ul, cap);
                    assert!(d + u <= cap);
                    assert!(d <= dl && u <= ul);
                }
            }
        }
    }

    #[test]
    fn test_shift_to_relays_respects_headroom() {
        // 流0、1为终端下行，流2为中继下行
        let mut shares = vec![4, 4, 2];
        let requests = vec![4, 4, 10];
        let moved = shift_to_relays(&mut shares, &requests, &[0, 1], &[(2, 3)], 0.5);
        assert_eq!(moved, 3);
        assert_eq!(shares.iter().sum::<usize>(), 10);
        assert_eq!(shares[2], 5);
    }

    #[test]
    fn test_shift_with_zero_eta_is_noop() {
        let mut shares = vec![4, 2];
        let moved = shift_to_relays(&mut shares, &[4, 8], &[0], &[(1, 6)], 0.0);
        assert_eq!(moved, 0);
        assert_eq!(shares, vec![4, 2]);
    }
}
