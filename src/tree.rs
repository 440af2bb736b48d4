// tree.rs -- The ternary decision tree being optimized.
//
// A node is either an internal test (an index into the offset-pair table,
// three owned children for the less / equal / greater outcomes) or a leaf
// carrying the corner classification. The whole tree is one owned root; the
// annealer deep-clones it every iteration and mutates the clone, so the
// accepted tree and the working copy never alias.
//
// Invariant: a leaf reached from the root through `eq` edges only must
// classify as non-corner. Two pixels comparing equal carries no corner
// evidence on its own, and the search must not be able to learn otherwise.
// Every operation here preserves the invariant; a violation is a bug in
// this module, not a recoverable condition.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The three children of an internal node, present or absent together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Children {
    pub lt: Node,
    pub eq: Node,
    pub gt: Node,
}

/// One tree node. A tree is its root node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Index into the offset-pair table. Meaningless on leaves.
    pub offset_index: usize,
    /// Corner classification. Meaningful only on leaves.
    pub is_corner: bool,
    /// `Some` for internal nodes, `None` for leaves.
    pub children: Option<Box<Children>>,
}

/// Flattened node for serialization: preorder (node, lt, eq, gt), which is
/// enough to rebuild the topology since arity is always zero or three.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatNode {
    Test { offset_index: usize },
    Leaf { is_corner: bool },
}

impl Node {
    /// Build a leaf.
    pub fn leaf(is_corner: bool) -> Node {
        Node {
            offset_index: 0,
            is_corner,
            children: None,
        }
    }

    /// Build a full random tree of exactly the given depth.
    ///
    /// At depth 0 this is a leaf: forced non-corner when `is_eq_branch`,
    /// otherwise a coin flip. Above that, an internal node with a uniformly
    /// random test and children generated at depth−1, where only the `eq`
    /// child inherits the eq constraint.
    ///
    /// Draw order per node: offset index, then lt, eq, gt subtrees (leaf
    /// coin flips draw in the same positions). Reordering this would change
    /// seeded runs.
    pub fn random<R: Rng>(depth: usize, is_eq_branch: bool, num_offsets: usize, rng: &mut R) -> Node {
        assert!(num_offsets > 0, "offset table must not be empty");
        if depth == 0 {
            let is_corner = if is_eq_branch { false } else { rng.gen() };
            Node::leaf(is_corner)
        } else {
            let offset_index = rng.gen_range(0..num_offsets);
            let lt = Node::random(depth - 1, false, num_offsets, rng);
            let eq = Node::random(depth - 1, true, num_offsets, rng);
            let gt = Node::random(depth - 1, false, num_offsets, rng);
            Node {
                offset_index,
                is_corner: false,
                children: Some(Box::new(Children { lt, eq, gt })),
            }
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Total node count, internal and leaf. Recomputed structurally -- the
    /// size regularizer must never drift from the actual tree.
    pub fn num_nodes(&self) -> usize {
        match &self.children {
            None => 1,
            Some(ch) => 1 + ch.lt.num_nodes() + ch.eq.num_nodes() + ch.gt.num_nodes(),
        }
    }

    /// Depth of the tree (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        match &self.children {
            None => 0,
            Some(ch) => 1 + ch.lt.depth().max(ch.eq.depth()).max(ch.gt.depth()),
        }
    }

    /// Find the n-th node in preorder (self, lt, eq, gt) together with
    /// whether it lies on an eq-only path from the root. The root itself
    /// counts as eq-reachable (zero eq edges).
    ///
    /// # Panics
    /// Panics if `n >= self.num_nodes()`.
    pub fn nth_node_mut(&mut self, mut n: usize) -> (&mut Node, bool) {
        let mut node = self;
        let mut on_eq_path = true;
        loop {
            if n == 0 {
                return (node, on_eq_path);
            }
            n -= 1;
            let ch = node
                .children
                .as_deref_mut()
                .expect("node index out of range");
            let lt_size = ch.lt.num_nodes();
            if n < lt_size {
                node = &mut ch.lt;
                on_eq_path = false;
                continue;
            }
            n -= lt_size;
            let eq_size = ch.eq.num_nodes();
            if n < eq_size {
                node = &mut ch.eq;
                // on_eq_path carries through an eq edge.
                continue;
            }
            n -= eq_size;
            node = &mut ch.gt;
            on_eq_path = false;
        }
    }

    /// Apply one random mutation to one uniformly chosen node.
    ///
    /// Leaves either grow a fresh depth-1 subtree or flip their class;
    /// an eq-reachable leaf always grows, since flipping it would break the
    /// eq invariant. Internal nodes get one of: a re-randomized test, a
    /// branch copy, or a splat back down to a leaf.
    pub fn mutate<R: Rng>(&mut self, num_offsets: usize, rng: &mut R) {
        let n = rng.gen_range(0..self.num_nodes());
        let (node, on_eq_path) = self.nth_node_mut(n);

        if node.is_leaf() {
            if rng.gen::<bool>() || on_eq_path {
                *node = Node::random(1, on_eq_path, num_offsets, rng);
            } else {
                node.is_corner = !node.is_corner;
            }
            return;
        }

        match rng.gen_range(0..3u8) {
            0 => {
                node.offset_index = rng.gen_range(0..num_offsets);
            }
            1 => {
                // Copy one child over another. Copying into the eq slot of
                // an eq-reachable node can carry corner leaves onto the eq
                // path; re-normalize the clone's eq spine in that case.
                let replaced = rng.gen_range(0..3u8);
                let mut source = rng.gen_range(0..3u8);
                while source == replaced {
                    source = rng.gen_range(0..3u8);
                }
                let ch = node.children.as_deref_mut().expect("internal node");
                let clone = match source {
                    0 => ch.lt.clone(),
                    1 => ch.eq.clone(),
                    _ => ch.gt.clone(),
                };
                match replaced {
                    0 => ch.lt = clone,
                    1 => {
                        ch.eq = clone;
                        if on_eq_path {
                            ch.eq.force_eq_spine_non_corner();
                        }
                    }
                    _ => ch.gt = clone,
                }
            }
            _ => {
                // Splat: drop all three children, becoming a leaf. The
                // offset index is cleared so a splatted leaf compares equal
                // to one rebuilt from its flat form.
                node.children = None;
                node.offset_index = 0;
                node.is_corner = if on_eq_path { false } else { rng.gen() };
            }
        }
    }

    /// Force every leaf reachable from here by eq-only edges to non-corner.
    fn force_eq_spine_non_corner(&mut self) {
        match self.children.as_deref_mut() {
            None => self.is_corner = false,
            Some(ch) => ch.eq.force_eq_spine_non_corner(),
        }
    }

    /// Whether every eq-only-reachable leaf classifies as non-corner.
    /// Cheap to check (one spine walk); the test suite asserts it after
    /// every mutation.
    pub fn eq_invariant_holds(&self) -> bool {
        match &self.children {
            None => !self.is_corner,
            Some(ch) => ch.eq.eq_invariant_holds(),
        }
    }

    /// Flatten to a preorder node list for lossless external reconstruction.
    pub fn flatten(&self) -> Vec<FlatNode> {
        let mut out = Vec::with_capacity(self.num_nodes());
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<FlatNode>) {
        match &self.children {
            None => out.push(FlatNode::Leaf {
                is_corner: self.is_corner,
            }),
            Some(ch) => {
                out.push(FlatNode::Test {
                    offset_index: self.offset_index,
                });
                ch.lt.flatten_into(out);
                ch.eq.flatten_into(out);
                ch.gt.flatten_into(out);
            }
        }
    }

    /// Rebuild a tree from its preorder flat form. Returns `None` if the
    /// list is truncated or has trailing nodes.
    pub fn from_flat(nodes: &[FlatNode]) -> Option<Node> {
        let mut pos = 0;
        let root = Self::parse_flat(nodes, &mut pos)?;
        (pos == nodes.len()).then_some(root)
    }

    fn parse_flat(nodes: &[FlatNode], pos: &mut usize) -> Option<Node> {
        let head = *nodes.get(*pos)?;
        *pos += 1;
        match head {
            FlatNode::Leaf { is_corner } => Some(Node::leaf(is_corner)),
            FlatNode::Test { offset_index } => {
                let lt = Self::parse_flat(nodes, pos)?;
                let eq = Self::parse_flat(nodes, pos)?;
                let gt = Self::parse_flat(nodes, pos)?;
                Some(Node {
                    offset_index,
                    is_corner: false,
                    children: Some(Box::new(Children { lt, eq, gt })),
                })
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent * 2);
        match &self.children {
            None => writeln!(
                f,
                "{pad}leaf {}",
                if self.is_corner { "corner" } else { "plain" }
            ),
            Some(ch) => {
                writeln!(f, "{pad}test {}", self.offset_index)?;
                ch.lt.fmt_indented(f, indent + 1)?;
                ch.eq.fmt_indented(f, indent + 1)?;
                ch.gt.fmt_indented(f, indent + 1)
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
