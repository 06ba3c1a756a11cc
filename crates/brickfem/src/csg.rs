//! CSG recording of part solids.
//!
//! A [`Shape`] carries the IR subtree of its parametric construction
//! history; nothing is evaluated here. Convert a finished shape into a
//! part graph with [`Shape::into_graph`].

use brickfem_ir::{CsgOp, Node, NodeId, PartDef, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for unique IR node IDs.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a globally unique [`NodeId`].
fn alloc_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A solid under construction.
///
/// Build with the primitive constructors, then combine with
/// [`Shape::union`], [`Shape::difference`] or the operator shorthands
/// (`+`, `-`).
#[derive(Debug, Clone)]
pub struct Shape {
    /// Human-readable name of the root operation.
    pub name: String,
    ir_node_id: NodeId,
    ir_nodes: HashMap<NodeId, Node>,
}

impl Shape {
    /// Create a leaf IR node and return `(id, nodes)`.
    fn make_leaf(name: &str, op: CsgOp) -> (NodeId, HashMap<NodeId, Node>) {
        let id = alloc_node_id();
        let mut nodes = HashMap::new();
        nodes.insert(
            id,
            Node {
                id,
                name: Some(name.to_string()),
                op,
            },
        );
        (id, nodes)
    }

    /// Build a binary CSG node, merging both children's IR maps.
    fn make_binary(
        name: &str,
        left: &Shape,
        right: &Shape,
        op_fn: impl FnOnce(NodeId, NodeId) -> CsgOp,
    ) -> (NodeId, HashMap<NodeId, Node>) {
        let id = alloc_node_id();
        let mut nodes = left.ir_nodes.clone();
        nodes.extend(right.ir_nodes.iter().map(|(&k, v)| (k, v.clone())));
        nodes.insert(
            id,
            Node {
                id,
                name: Some(name.to_string()),
                op: op_fn(left.ir_node_id, right.ir_node_id),
            },
        );
        (id, nodes)
    }

    /// Build a unary transform node, cloning the child's IR map.
    fn make_unary(
        name: &str,
        child: &Shape,
        op_fn: impl FnOnce(NodeId) -> CsgOp,
    ) -> (NodeId, HashMap<NodeId, Node>) {
        let id = alloc_node_id();
        let mut nodes = child.ir_nodes.clone();
        nodes.insert(
            id,
            Node {
                id,
                name: Some(name.to_string()),
                op: op_fn(child.ir_node_id),
            },
        );
        (id, nodes)
    }

    fn with_ir(name: String, ir_node_id: NodeId, ir_nodes: HashMap<NodeId, Node>) -> Self {
        Self {
            name,
            ir_node_id,
            ir_nodes,
        }
    }

    /// Create an empty shape.
    pub fn empty(name: impl Into<String>) -> Self {
        let name = name.into();
        let (id, nodes) = Self::make_leaf(&name, CsgOp::Empty);
        Self::with_ir(name, id, nodes)
    }

    /// Create a box with one corner at the origin.
    pub fn cube(name: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        let name = name.into();
        let (id, nodes) = Self::make_leaf(
            &name,
            CsgOp::Cube {
                size: Vec3::new(x, y, z),
            },
        );
        Self::with_ir(name, id, nodes)
    }

    /// Create a cylinder along +Y with its base centered at the origin.
    pub fn cylinder(name: impl Into<String>, radius: f64, height: f64) -> Self {
        let name = name.into();
        let (id, nodes) = Self::make_leaf(&name, CsgOp::Cylinder { radius, height });
        Self::with_ir(name, id, nodes)
    }

    /// Axis-aligned box spanning `min` to `max`.
    pub fn block(name: impl Into<String>, min: [f64; 3], max: [f64; 3]) -> Self {
        Self::cube(name, max[0] - min[0], max[1] - min[1], max[2] - min[2])
            .translate(min[0], min[1], min[2])
    }

    /// Vertical cylinder with its base center at `(x, y, z)`.
    pub fn post(name: impl Into<String>, radius: f64, height: f64, at: [f64; 3]) -> Self {
        Self::cylinder(name, radius, height).translate(at[0], at[1], at[2])
    }

    /// Boolean difference (self - other).
    pub fn difference(&self, other: &Shape) -> Self {
        let result_name = format!("{}-diff", self.name);
        let (id, nodes) = Self::make_binary(&result_name, self, other, |l, r| CsgOp::Difference {
            left: l,
            right: r,
        });
        Self::with_ir(result_name, id, nodes)
    }

    /// Boolean union (self + other).
    pub fn union(&self, other: &Shape) -> Self {
        let result_name = format!("{}-union", self.name);
        let (id, nodes) = Self::make_binary(&result_name, self, other, |l, r| CsgOp::Union {
            left: l,
            right: r,
        });
        Self::with_ir(result_name, id, nodes)
    }

    /// Union of all shapes, `None` if there are none.
    ///
    /// Callers skip the Boolean step entirely on `None`, so no operation
    /// ever has an empty operand.
    pub fn union_all(name: &str, shapes: impl IntoIterator<Item = Shape>) -> Option<Shape> {
        let mut iter = shapes.into_iter();
        let first = iter.next()?;
        let mut acc = iter.fold(first, |acc, s| acc.union(&s));
        acc.name = name.to_string();
        Some(acc)
    }

    /// Translate the shape.
    pub fn translate(&self, x: f64, y: f64, z: f64) -> Self {
        let (id, nodes) = Self::make_unary(&self.name, self, |child| CsgOp::Translate {
            child,
            offset: Vec3::new(x, y, z),
        });
        Self::with_ir(self.name.clone(), id, nodes)
    }

    /// Whether the root is the empty solid.
    pub fn is_empty(&self) -> bool {
        matches!(
            self.ir_nodes.get(&self.ir_node_id).map(|n| &n.op),
            Some(CsgOp::Empty)
        )
    }

    /// Number of recorded operations.
    pub fn node_count(&self) -> usize {
        self.ir_nodes.len()
    }

    /// Point membership test (boundaries count as inside).
    pub fn contains(&self, p: Vec3) -> bool {
        let nodes: BTreeMap<NodeId, Node> = self
            .ir_nodes
            .iter()
            .map(|(&k, v)| (k, v.clone()))
            .collect();
        graph_contains(&nodes, self.ir_node_id, p)
    }

    /// Finish construction: `(root, nodes)` with ids renumbered from 1 in
    /// construction order, so equal shapes give equal graphs.
    pub fn into_graph(self) -> (NodeId, BTreeMap<NodeId, Node>) {
        let mut ids: Vec<NodeId> = self.ir_nodes.keys().copied().collect();
        ids.sort_unstable();
        let remap: HashMap<NodeId, NodeId> = ids
            .iter()
            .enumerate()
            .map(|(i, &old)| (old, i as NodeId + 1))
            .collect();
        let map = |id: NodeId| remap.get(&id).copied().unwrap_or(id);

        let nodes = self
            .ir_nodes
            .into_values()
            .map(|node| {
                let op = match node.op {
                    CsgOp::Union { left, right } => CsgOp::Union {
                        left: map(left),
                        right: map(right),
                    },
                    CsgOp::Difference { left, right } => CsgOp::Difference {
                        left: map(left),
                        right: map(right),
                    },
                    CsgOp::Translate { child, offset } => CsgOp::Translate {
                        child: map(child),
                        offset,
                    },
                    leaf => leaf,
                };
                let id = map(node.id);
                (
                    id,
                    Node {
                        id,
                        name: node.name,
                        op,
                    },
                )
            })
            .collect();
        (map(self.ir_node_id), nodes)
    }
}

impl std::ops::Add for &Shape {
    type Output = Shape;
    fn add(self, rhs: &Shape) -> Shape {
        self.union(rhs)
    }
}

impl std::ops::Sub for &Shape {
    type Output = Shape;
    fn sub(self, rhs: &Shape) -> Shape {
        self.difference(rhs)
    }
}

/// Point membership test on a recorded graph (boundaries count as inside).
pub fn graph_contains(nodes: &BTreeMap<NodeId, Node>, root: NodeId, p: Vec3) -> bool {
    let Some(node) = nodes.get(&root) else {
        return false;
    };
    match &node.op {
        CsgOp::Cube { size } => {
            (0.0..=size.x).contains(&p.x)
                && (0.0..=size.y).contains(&p.y)
                && (0.0..=size.z).contains(&p.z)
        }
        CsgOp::Cylinder { radius, height } => {
            (0.0..=*height).contains(&p.y) && p.x * p.x + p.z * p.z <= radius * radius
        }
        CsgOp::Empty => false,
        CsgOp::Union { left, right } => {
            graph_contains(nodes, *left, p) || graph_contains(nodes, *right, p)
        }
        CsgOp::Difference { left, right } => {
            graph_contains(nodes, *left, p) && !graph_contains(nodes, *right, p)
        }
        CsgOp::Translate { child, offset } => graph_contains(
            nodes,
            *child,
            Vec3::new(p.x - offset.x, p.y - offset.y, p.z - offset.z),
        ),
    }
}

/// Point membership test on a finished part.
pub fn part_contains(part: &PartDef, p: Vec3) -> bool {
    graph_contains(&part.nodes, part.root, p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_with_bore() {
        let block = Shape::block("block", [0.0, 0.0, 0.0], [10.0, 5.0, 10.0]);
        let bore = Shape::post("bore", 2.0, 5.0, [5.0, 0.0, 5.0]);
        let part = &block - &bore;
        assert!(part.contains(Vec3::new(1.0, 2.5, 1.0)));
        assert!(!part.contains(Vec3::new(5.0, 2.5, 5.0)));
        assert!(!part.contains(Vec3::new(11.0, 2.5, 1.0)));
    }

    #[test]
    fn union_all_skips_empty_input() {
        assert!(Shape::union_all("none", Vec::new()).is_none());
        let posts = (0..3).map(|i| Shape::post("p", 1.0, 1.0, [4.0 * i as f64, 0.0, 0.0]));
        let all = Shape::union_all("posts", posts).unwrap();
        assert_eq!(all.name, "posts");
        assert!(all.contains(Vec3::new(8.0, 0.5, 0.0)));
        assert!(!all.contains(Vec3::new(2.0, 0.5, 0.0)));
    }

    #[test]
    fn graph_is_renumbered_compactly() {
        let a = Shape::cube("a", 1.0, 1.0, 1.0);
        let b = Shape::cylinder("b", 0.5, 2.0).translate(0.5, 0.0, 0.5);
        let shape = &a + &b;
        assert_eq!(shape.node_count(), 4);
        let (root, nodes) = shape.clone().into_graph();
        assert_eq!(nodes.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(root, 4);
        assert!(graph_contains(&nodes, root, Vec3::new(0.5, 1.5, 0.5)));

        // A second identical construction yields the same graph.
        let again = &Shape::cube("a", 1.0, 1.0, 1.0)
            + &Shape::cylinder("b", 0.5, 2.0).translate(0.5, 0.0, 0.5);
        assert_eq!(again.into_graph(), (root, nodes));
    }

    #[test]
    fn empty_shape() {
        let e = Shape::empty("nothing");
        assert!(e.is_empty());
        assert!(!e.contains(Vec3::zero()));
    }
}
