use std::collections::HashMap;
use std::sync::Arc;

use anyhow::*;
use colored::Colorize;
use newick::NewickTree;

use crate::errors::RuntimeError;

pub type NodeID = usize;

/// A clade as read from a .newick file, before renumbering.
#[derive(PartialEq, Debug, Clone)]
pub struct Clade {
    /// Can be empty for internal nodes.
    name: String,
    children: Vec<Clade>,
}

impl Clade {
    pub fn new(name: &str, children: Vec<Clade>) -> Clade {
        Clade { name: name.to_string(), children }
    }

    pub fn leaf(name: &str) -> Clade {
        Clade::new(name, vec![])
    }

    /// Join two clades into a new named parent node.
    pub fn join(name: &str, l: Clade, r: Clade) -> Clade {
        Clade::new(name, vec![l, r])
    }

    fn from_newick(t: &NewickTree) -> Clade {
        fn rec(t: &NewickTree, n: newick::NodeID) -> Clade {
            Clade {
                name: t.name(n).map(|s| s.to_string()).unwrap_or_default(),
                children: t.children(n).into_iter().flatten().map(|c| rec(t, *c)).collect(),
            }
        }
        rec(t, t.root())
    }
}

/// Recursive binary view of a species (sub)tree; children are shared with
/// the owning [`SpeciesTree`] and with every other view.
#[derive(Debug)]
pub enum Subtree {
    Leaf(NodeID),
    Internal { node: NodeID, left: Arc<Subtree>, right: Arc<Subtree> },
}

impl Subtree {
    pub fn root(&self) -> NodeID {
        match self {
            Subtree::Leaf(n) => *n,
            Subtree::Internal { node, .. } => *node,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Subtree::Leaf(_))
    }

    fn rec_leaves(&self, ax: &mut Vec<NodeID>) {
        match self {
            Subtree::Leaf(n) => ax.push(*n),
            Subtree::Internal { left, right, .. } => {
                left.rec_leaves(ax);
                right.rec_leaves(ax);
            }
        }
    }

    pub fn leaves(&self) -> Vec<NodeID> {
        let mut r = Vec::new();
        self.rec_leaves(&mut r);
        r
    }
}

struct Node {
    name: String,
    parent: Option<NodeID>,
    children: Option<(NodeID, NodeID)>,
}

/// An immutable, strictly binary species tree over dense node IDs; the root
/// is 0 and IDs follow a pre-order traversal.
pub struct SpeciesTree {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeID>,
    subtrees: Vec<Arc<Subtree>>,
    leaf_counts: Vec<usize>,
}

impl std::fmt::Debug for SpeciesTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpeciesTree({} nodes, {} leaves)", self.len(), self.leaves().count())
    }
}

impl SpeciesTree {
    pub fn from_newick_file(filename: &str) -> Result<SpeciesTree> {
        let t = newick::one_from_filename(filename)
            .with_context(|| anyhow!("while opening {}", filename.yellow().bold()))?;
        SpeciesTree::from_clade(&Clade::from_newick(&t))
    }

    pub fn from_newick_str(content: &str) -> Result<SpeciesTree> {
        let t = newick::one_from_string(content).context("while parsing species tree")?;
        SpeciesTree::from_clade(&Clade::from_newick(&t))
    }

    pub fn from_clade(root: &Clade) -> Result<SpeciesTree> {
        fn rec_add(c: &Clade, parent: Option<NodeID>, nodes: &mut Vec<Node>) -> Result<NodeID> {
            let me = nodes.len();
            nodes.push(Node { name: c.name.clone(), parent, children: None });
            match c.children.as_slice() {
                [] => {}
                [l, r] => {
                    let l = rec_add(l, Some(me), nodes)?;
                    let r = rec_add(r, Some(me), nodes)?;
                    nodes[me].children = Some((l, r));
                }
                cs => {
                    let name = if c.name.is_empty() { format!("#{}", me) } else { c.name.clone() };
                    bail!(RuntimeError::NonBinaryTree(name, cs.len()))
                }
            }
            Ok(me)
        }

        let mut nodes = Vec::new();
        rec_add(root, None, &mut nodes)?;

        let mut by_name = HashMap::new();
        for (i, n) in nodes.iter_mut().enumerate() {
            if n.name.is_empty() {
                n.name = format!("#{}", i);
            }
            if by_name.insert(n.name.clone(), i).is_some() {
                bail!(RuntimeError::DuplicateId("species tree node", n.name.clone()));
            }
        }

        // Children always have larger IDs than their parent
        let mut subtrees: Vec<Option<Arc<Subtree>>> = vec![None; nodes.len()];
        let mut leaf_counts = vec![0; nodes.len()];
        for i in (0..nodes.len()).rev() {
            let (subtree, count) = match nodes[i].children {
                None => (Subtree::Leaf(i), 1),
                Some((l, r)) => (
                    Subtree::Internal {
                        node: i,
                        left: subtrees[l].clone().context("unbuilt left subtree")?,
                        right: subtrees[r].clone().context("unbuilt right subtree")?,
                    },
                    leaf_counts[l] + leaf_counts[r],
                ),
            };
            subtrees[i] = Some(Arc::new(subtree));
            leaf_counts[i] = count;
        }

        Ok(SpeciesTree {
            nodes,
            by_name,
            subtrees: subtrees.into_iter().flatten().collect(),
            leaf_counts,
        })
    }

    pub fn root(&self) -> NodeID {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, n: NodeID) -> &str {
        &self.nodes[n].name
    }

    pub fn node(&self, name: &str) -> Option<NodeID> {
        self.by_name.get(name).copied()
    }

    /// Resolve a node name, failing with a configuration error if absent.
    pub fn node_by_name(&self, name: &str) -> Result<NodeID> {
        self.node(name).ok_or_else(|| RuntimeError::SpeciesNotFound(name.to_owned()).into())
    }

    /// Resolve a strain name to its leaf.
    pub fn leaf_by_name(&self, name: &str) -> Result<NodeID> {
        self.node(name)
            .filter(|&n| self.is_leaf(n))
            .ok_or_else(|| RuntimeError::SpeciesNotFound(name.to_owned()).into())
    }

    pub fn is_leaf(&self, n: NodeID) -> bool {
        self.nodes[n].children.is_none()
    }

    pub fn children(&self, n: NodeID) -> Option<(NodeID, NodeID)> {
        self.nodes[n].children
    }

    pub fn parent(&self, n: NodeID) -> Option<NodeID> {
        self.nodes[n].parent
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeID> + '_ {
        (0..self.nodes.len()).filter(move |&n| self.is_leaf(n))
    }

    fn rec_descendants(&self, i: NodeID, ax: &mut Vec<NodeID>) {
        if let Some((l, r)) = self.nodes[i].children {
            for j in [l, r] {
                ax.push(j);
                self.rec_descendants(j, ax)
            }
        }
    }

    /// All the nodes strictly below `n`, in pre-order.
    pub fn descendants(&self, n: NodeID) -> Vec<NodeID> {
        let mut r = Vec::with_capacity(2 * self.leaf_counts[n]);
        self.rec_descendants(n, &mut r);
        r
    }

    pub fn ancestors(&self, n: NodeID) -> Vec<NodeID> {
        let mut r = Vec::new();
        let mut me = n;
        while let Some(parent) = self.nodes[me].parent {
            r.push(parent);
            me = parent;
        }
        r
    }

    pub fn leaf_count(&self, n: NodeID) -> usize {
        self.leaf_counts[n]
    }

    pub fn subtree(&self, n: NodeID) -> Arc<Subtree> {
        self.subtrees[n].clone()
    }
}
