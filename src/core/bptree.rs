// B+-tree navigation: maps a logical element index to (leaf node, index in leaf).
// Inner nodes come in two forms. Compact: element 0 is a tagged elements-per-child
// count. General: element 0 refs an array of cumulative child end offsets.
// Children start at element 1; the last element is tagged `total_count`.
use tracing::trace;

use crate::core::error::Error;
use crate::core::node::{Node, Ref, RefValue};

/// Upper bound on descent depth; deeper trees are treated as corrupt.
pub const MAX_TREE_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChildPos {
    pub child_index: usize,
    pub index_in_child: usize,
    pub child: Ref,
}

#[derive(Clone, Copy, Debug)]
pub struct BpTree<'a> {
    root: Node<'a>,
}

impl<'a> BpTree<'a> {
    pub fn open(buf: &'a [u8], at: Ref) -> Result<Self, Error> {
        Ok(Self::from_root(Node::open(buf, at)?))
    }

    pub fn from_root(root: Node<'a>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> Node<'a> {
        self.root
    }

    pub fn root_is_leaf(&self) -> bool {
        !self.root.header().is_inner_bptree_node
    }

    /// Element count. For a leaf root this is the raw node size, which callers
    /// with sentinel- or offsets-based leaves must translate themselves.
    pub fn len(&self) -> Result<usize, Error> {
        if self.root_is_leaf() {
            return Ok(self.root.len());
        }
        inner_count(&self.root)
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        self.len().map(|len| len == 0)
    }

    /// Resolves `index` to its leaf. A leaf root is returned as is; the leaf
    /// decoder range-checks the index against its own logical size.
    pub fn get(&self, index: usize) -> Result<(Node<'a>, usize), Error> {
        if self.root_is_leaf() {
            return Ok((self.root, index));
        }
        let count = inner_count(&self.root)?;
        if index >= count {
            return Err(Error::range(format!("index {index} out of range for tree of {count}"))
                .with_offset(self.root.at()));
        }

        let mut node = self.root;
        let mut index = index;
        for depth in 0..MAX_TREE_DEPTH {
            let pos = find_child(&node, index)?;
            let child = node.open_ref(pos.child)?;
            trace!(depth, parent = node.at(), child = pos.child, index = pos.index_in_child, "bptree descend");
            if !child.header().is_inner_bptree_node {
                return Ok((child, pos.index_in_child));
            }
            node = child;
            index = pos.index_in_child;
        }
        Err(depth_exceeded(self.root.at()))
    }

    /// Every leaf in element order. An inner root yields at most one leaf per
    /// declared element, so children shared between slots cannot multiply the walk.
    pub fn leaves(&self) -> Result<Vec<Node<'a>>, Error> {
        if self.root_is_leaf() {
            return Ok(vec![self.root]);
        }
        let declared = inner_count(&self.root)?;
        let mut leaves = Vec::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if !node.header().is_inner_bptree_node {
                if leaves.len() >= declared {
                    return Err(Error::format(format!(
                        "b+tree has more leaves than its {declared} declared elements"
                    ))
                    .with_offset(self.root.at()));
                }
                leaves.push(node);
                continue;
            }
            if depth >= MAX_TREE_DEPTH {
                return Err(depth_exceeded(self.root.at()));
            }
            if node.len() < 2 {
                return Err(Error::format("inner b+tree node without children").with_offset(node.at()));
            }
            for slot in (1..node.len() - 1).rev() {
                stack.push((node.child(slot)?, depth + 1));
            }
        }
        Ok(leaves)
    }
}

/// Locates the child of inner node `node` holding element `index`.
pub fn find_child(node: &Node<'_>, index: usize) -> Result<ChildPos, Error> {
    let (child_index, index_in_child) = match node.get_ref(0)? {
        RefValue::Tagged(elems_per_child) => {
            let elems_per_child = usize::try_from(elems_per_child)
                .ok()
                .filter(|&count| count > 0)
                .ok_or_else(|| {
                    Error::format("compact b+tree node with invalid elements per child")
                        .with_offset(node.at())
                })?;
            (index / elems_per_child, index % elems_per_child)
        }
        RefValue::Ref(offsets_ref) => {
            let offsets = node.open_ref(offsets_ref)?;
            let mut child_index = 0;
            while child_index < offsets.len() {
                if offsets.get(child_index)? > index as i64 {
                    break;
                }
                child_index += 1;
            }
            let elem_index_offset = if child_index == 0 {
                0
            } else {
                let offset = offsets.get(child_index - 1)?;
                usize::try_from(offset).map_err(|_| {
                    Error::format(format!("negative child offset {offset}")).with_offset(offsets.at())
                })?
            };
            (child_index, index - elem_index_offset)
        }
        RefValue::Null => {
            return Err(Error::format("inner b+tree node has a null first element")
                .with_offset(node.at()));
        }
    };

    let child = match node.get_ref(1 + child_index)? {
        RefValue::Ref(at) => at,
        _ => {
            return Err(Error::format(format!("b+tree child slot {child_index} is not a ref"))
                .with_offset(node.at()));
        }
    };
    Ok(ChildPos {
        child_index,
        index_in_child,
        child,
    })
}

fn inner_count(node: &Node<'_>) -> Result<usize, Error> {
    if node.is_empty() {
        return Err(Error::format("inner b+tree node is empty").with_offset(node.at()));
    }
    let last = node.get(node.len() - 1)?;
    usize::try_from(last / 2)
        .map_err(|_| Error::format(format!("negative b+tree count {last}")).with_offset(node.at()))
}

fn depth_exceeded(root: Ref) -> Error {
    Error::range(format!("b+tree deeper than {MAX_TREE_DEPTH} levels")).with_offset(root)
}
