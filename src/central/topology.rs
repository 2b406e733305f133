//! 多跳拓扑图
//! Multi-hop Topology Map
//!
//! 职责：
//! - 记录中继节点之间的父子关系与跳数深度
//! - 将每个节点下的所有终端折叠为一个终端桶节点
//! - 按广度优先顺序提供边列表

use crate::{
    error::{Error, Result},
    identity::Imsi,
};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::{debug, info};

/// Vertex of the coordination tree.
/// 协调树的顶点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    /// The donor or a relay, addressed by its network-wide identity.
    /// 宿主或中继节点，以全网标识寻址。
    Node(Imsi),
    /// All terminals attached to one serving node, folded into one vertex.
    /// 某服务节点下的全部终端，折叠为一个顶点。
    Terminals { serving: Imsi },
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Node(imsi) => write!(f, "{imsi}"),
            NodeKey::Terminals { serving } => write!(f, "terminals@{serving}"),
        }
    }
}

/// A parent → child link of the tree.
/// 树中的父 → 子链路。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub parent: Imsi,
    pub child: NodeKey,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    parent: Option<Imsi>,
    depth: u32,
}

/// Parent/child associations and hop depths, rooted at the donor.
/// 以宿主为根的父子关系与跳数深度。
#[derive(Debug, Clone)]
pub struct Topology {
    vertices: BTreeMap<NodeKey, Vertex>,
    children: BTreeMap<Imsi, Vec<NodeKey>>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    /// Creates a topology holding only the donor.
    /// 创建只包含宿主的拓扑。
    pub fn new() -> Self {
        let mut vertices = BTreeMap::new();
        vertices.insert(
            NodeKey::Node(Imsi::DONOR),
            Vertex {
                parent: None,
                depth: 0,
            },
        );
        Self {
            vertices,
            children: BTreeMap::new(),
        }
    }

    fn attach(&mut self, child: NodeKey, parent: Imsi) -> Result<u32> {
        let parent_depth = self
            .vertices
            .get(&NodeKey::Node(parent))
            .map(|v| v.depth)
            .ok_or(Error::UnknownParent(parent))?;
        let depth = parent_depth + 1;
        self.vertices.insert(
            child,
            Vertex {
                parent: Some(parent),
                depth,
            },
        );
        self.children.entry(parent).or_default().push(child);
        Ok(depth)
    }

    /// Registers a relay under its parent. Returns the relay's hop depth.
    /// 在父节点下注册中继，返回其跳数深度。
    pub fn register_relay(&mut self, child: Imsi, parent: Imsi) -> Result<u32> {
        if self.vertices.contains_key(&NodeKey::Node(child)) {
            return Err(Error::DuplicateNode(child));
        }
        let depth = self.attach(NodeKey::Node(child), parent)?;
        info!(%child, %parent, depth, "Relay registered");
        Ok(depth)
    }

    /// Adds the terminal bucket of a serving node if missing. Returns whether it was added.
    /// 若不存在则添加某服务节点的终端桶，返回是否新增。
    pub fn ensure_terminal_bucket(&mut self, serving: Imsi) -> Result<bool> {
        let key = NodeKey::Terminals { serving };
        if self.vertices.contains_key(&key) {
            return Ok(false);
        }
        self.attach(key, serving)?;
        debug!(%serving, "Terminal bucket added");
        Ok(true)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.vertices.contains_key(&key)
    }

    pub fn depth(&self, key: NodeKey) -> Option<u32> {
        self.vertices.get(&key).map(|v| v.depth)
    }

    pub fn parent(&self, key: NodeKey) -> Option<Imsi> {
        self.vertices.get(&key)?.parent
    }

    pub fn children(&self, node: Imsi) -> &[NodeKey] {
        self.children.get(&node).map_or(&[], Vec::as_slice)
    }

    /// Donor and relays in breadth-first order.
    /// 按广度优先顺序排列的宿主与中继。
    pub fn nodes_breadth_first(&self) -> Vec<Imsi> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([Imsi::DONOR]);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for child in self.children(node) {
                if let NodeKey::Node(imsi) = child {
                    queue.push_back(*imsi);
                }
            }
        }
        order
    }

    /// Every edge, parents in breadth-first order.
    /// 所有边，父节点按广度优先顺序排列。
    pub fn edges(&self) -> Vec<Edge> {
        self.nodes_breadth_first()
            .into_iter()
            .flat_map(|parent| {
                self.children(parent)
                    .iter()
                    .map(move |&child| Edge { parent, child })
            })
            .collect()
    }

    /// Number of vertices, terminal buckets included.
    /// 顶点数量，包含终端桶。
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
