//! Maximum-weight matching on the coordination tree.
//!
//! A tree admits an exact dynamic program: bottom-up, every vertex gets the
//! best subtree value with the vertex left free and with the vertex matched to
//! one of its children. A top-down pass then reads the chosen edges back.
//!
//! Ambiguity is resolved toward fewer hints: when two children of a vertex tie
//! for the best gain, or matching a vertex gains nothing over leaving it free,
//! the vertex stays unmatched.
//!
//! 协调树上的最大权匹配。树上存在精确的动态规划：自底向上为每个顶点计算其空闲时与
//! 匹配到某个子节点时的最佳子树值，再自顶向下读出选中的边。出现歧义时倾向于更少的提示：
//! 若某顶点的两个子节点增益相同，或匹配该顶点并不优于保持空闲，则该顶点不匹配。

use crate::{
    central::topology::{Edge, NodeKey, Topology},
    identity::Imsi,
};
use std::collections::BTreeMap;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Score {
    /// Best subtree value with the vertex unmatched.
    free: f64,
    /// Best subtree value with the vertex matched to `choice`.
    matched: f64,
    choice: Option<NodeKey>,
}

impl Score {
    const LEAF: Score = Score {
        free: 0.0,
        matched: f64::NEG_INFINITY,
        choice: None,
    };

    fn best(&self) -> f64 {
        self.free.max(self.matched)
    }
}

/// Selects vertex-disjoint edges of maximum total weight.
///
/// Edges missing from `weights`, or weighted zero or less, are never selected.
/// The result lists edges in breadth-first parent order.
///
/// 选出总权重最大的、顶点不相交的边集。`weights` 中缺失或权重不大于零的边永远不会被选中。
/// 结果按父节点广度优先顺序排列。
pub fn max_weight_matching(topology: &Topology, weights: &BTreeMap<Edge, f64>) -> Vec<Edge> {
    let order = topology.nodes_breadth_first();
    let mut scores: BTreeMap<NodeKey, Score> = BTreeMap::new();

    for &node in order.iter().rev() {
        let children = topology.children(node);
        let score_of = |child: &NodeKey| scores.get(child).copied().unwrap_or(Score::LEAF);
        let free: f64 = children.iter().map(|c| score_of(c).best()).sum();

        let mut top: Option<(f64, NodeKey)> = None;
        let mut tied = false;
        for &child in children {
            let weight = weights
                .get(&Edge {
                    parent: node,
                    child,
                })
                .copied()
                .unwrap_or(0.0);
            if !(weight > EPSILON) {
                continue;
            }
            let child_score = score_of(&child);
            let gain = weight + child_score.free - child_score.best();
            match top {
                Some((best, _)) if (gain - best).abs() <= EPSILON => tied = true,
                Some((best, _)) if gain < best => {}
                _ => {
                    top = Some((gain, child));
                    tied = false;
                }
            }
        }

        let (matched, choice) = match top {
            Some((gain, child)) if !tied => (free + gain, Some(child)),
            _ => (f64::NEG_INFINITY, None),
        };
        scores.insert(
            NodeKey::Node(node),
            Score {
                free,
                matched,
                choice,
            },
        );
    }

    // 自顶向下：已与父节点匹配的顶点不能再匹配
    let mut chosen: BTreeMap<Imsi, NodeKey> = BTreeMap::new();
    let mut stack = vec![(Imsi::DONOR, false)];
    while let Some((node, taken)) = stack.pop() {
        let score = scores
            .get(&NodeKey::Node(node))
            .copied()
            .unwrap_or(Score::LEAF);
        let choice = if !taken && score.matched > score.free + EPSILON {
            score.choice
        } else {
            None
        };
        if let Some(child) = choice {
            chosen.insert(node, child);
        }
        for &child in topology.children(node) {
            if let NodeKey::Node(imsi) = child {
                stack.push((imsi, choice == Some(child)));
            }
        }
    }

    topology
        .edges()
        .into_iter()
        .filter(|e| chosen.get(&e.parent) == Some(&e.child))
        .collect()
}
