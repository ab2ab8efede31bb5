use std::mem;

use tracing::trace;

use crate::error::{invariant, Result};

/// Leaves are split at their midpoint once they grow past this many code
/// points.
pub const MAX_LEAF_SIZE: usize = 1024;

/// The root is rebuilt once one side outweighs the other by more than this.
pub const REBALANCE_THRESHOLD: f64 = 3.0;

/// A node of the rope's binary tree.
///
/// Each internal node exclusively owns its two children and caches the
/// length of its left subtree as `weight`.  Leaves own a contiguous run of
/// code points.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(Vec<char>),
    Internal {
        left: Box<Node>,
        right: Box<Node>,
        weight: usize,
    },
}

impl Node {
    /// Creates a leaf with room to grow up to the split point without
    /// reallocating.
    pub fn new_leaf(chars: &[char]) -> Node {
        let mut data = Vec::with_capacity(MAX_LEAF_SIZE.max(chars.len()) + 1);
        data.extend_from_slice(chars);
        Node::Leaf(data)
    }

    fn new_internal(left: Node, right: Node) -> Node {
        Node::Internal {
            weight: left.len(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Builds a fresh tree over `chars`, splitting at the midpoint until every
    /// piece fits in a leaf.
    ///
    /// Runs in O(N) time.
    pub fn build(chars: &[char]) -> Node {
        if chars.len() <= MAX_LEAF_SIZE {
            Node::new_leaf(chars)
        } else {
            let mid = chars.len() / 2;
            Node::new_internal(Node::build(&chars[..mid]), Node::build(&chars[mid..]))
        }
    }

    /// Number of code points under this node.
    ///
    /// Follows the right spine, so this is O(log N) for a balanced tree.
    pub fn len(&self) -> usize {
        let mut node = self;
        let mut total = 0;
        loop {
            match *node {
                Node::Leaf(ref data) => return total + data.len(),
                Node::Internal {
                    ref right, weight, ..
                } => {
                    total += weight;
                    node = right;
                }
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(*self, Node::Leaf(_))
    }

    fn is_empty_leaf(&self) -> bool {
        matches!(*self, Node::Leaf(ref data) if data.is_empty())
    }

    pub fn weight(&self) -> Option<usize> {
        match *self {
            Node::Leaf(_) => None,
            Node::Internal { weight, .. } => Some(weight),
        }
    }

    /// Returns the code point at `index`, which must be less than `len()`.
    pub fn char_at(&self, index: usize) -> Result<char> {
        let mut node = self;
        let mut index = index;
        loop {
            match *node {
                Node::Leaf(ref data) => {
                    return data
                        .get(index)
                        .copied()
                        .ok_or_else(|| invariant("leaf index out of bounds"));
                }
                Node::Internal {
                    ref left,
                    ref right,
                    weight,
                } => {
                    if index < weight {
                        node = left;
                    } else {
                        index -= weight;
                        node = right;
                    }
                }
            }
        }
    }

    /// Inserts `c` at `index`, which must be at most `len()`.
    ///
    /// Overfull leaves are split at their midpoint into two new leaves joined
    /// by a new internal node.
    pub fn insert(&mut self, index: usize, c: char) -> Result<()> {
        match self {
            Node::Leaf(data) => {
                if index > data.len() {
                    return Err(invariant("leaf insert index out of bounds"));
                }
                data.insert(index, c);

                if data.len() > MAX_LEAF_SIZE {
                    let mid = data.len() / 2;
                    trace!(len = data.len(), mid, "splitting leaf");
                    let right = Node::new_leaf(&data[mid..]);
                    let left = Node::new_leaf(&data[..mid]);
                    *self = Node::new_internal(left, right);
                }
            }

            Node::Internal {
                left,
                right,
                weight,
            } => {
                if index < *weight {
                    left.insert(index, c)?;
                    *weight += 1;
                } else {
                    right.insert(index - *weight, c)?;
                }
            }
        }

        Ok(())
    }

    /// Removes and returns the code point at `index`.
    ///
    /// When a child becomes empty, its sibling is promoted into the parent's
    /// place.  Small leaves are not merged.
    pub fn remove(&mut self, index: usize) -> Result<char> {
        match self {
            Node::Leaf(data) => {
                if index >= data.len() {
                    return Err(invariant("leaf remove index out of bounds"));
                }
                Ok(data.remove(index))
            }

            Node::Internal {
                left,
                right,
                weight,
            } => {
                // An emptied child has always collapsed to an empty leaf by
                // the time it returns, so only the child we descended into
                // needs looking at.
                let (c, emptied) = if index < *weight {
                    let c = left.remove(index)?;
                    *weight -= 1;
                    (c, *weight == 0)
                } else {
                    let c = right.remove(index - *weight)?;
                    (c, right.is_empty_leaf())
                };

                if emptied {
                    let survivor = if *weight == 0 { right } else { left };
                    trace!("promoting sibling over emptied node");
                    let promoted = mem::replace(&mut **survivor, Node::Leaf(Vec::new()));
                    *self = promoted;
                }

                Ok(c)
            }
        }
    }

    /// Appends the code points in `[start, end)` to `out`, visiting only the
    /// leaves that overlap the range.
    pub fn slice_into(&self, start: usize, end: usize, out: &mut String) {
        match *self {
            Node::Leaf(ref data) => {
                let s = start.min(data.len());
                let e = end.min(data.len());
                if s < e {
                    out.extend(&data[s..e]);
                }
            }

            Node::Internal {
                ref left,
                ref right,
                weight,
            } => {
                if start < weight {
                    left.slice_into(start, end.min(weight), out);
                }
                if end > weight {
                    right.slice_into(start.saturating_sub(weight), end - weight, out);
                }
            }
        }
    }

    /// Iterates over the leaves' contents in document order.
    pub fn leaves(&self) -> Leaves {
        Leaves { stack: vec![self] }
    }

    /// Height of the tree, counting a lone leaf as 1.
    pub fn depth(&self) -> usize {
        match *self {
            Node::Leaf(_) => 1,
            Node::Internal {
                ref left,
                ref right,
                ..
            } => 1 + left.depth().max(right.depth()),
        }
    }
}

//===========================================================================

/// In-order iterator over leaf contents.
pub(crate) struct Leaves<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a [char];

    fn next(&mut self) -> Option<&'a [char]> {
        while let Some(node) = self.stack.pop() {
            match *node {
                Node::Leaf(ref data) => return Some(&data[..]),
                Node::Internal {
                    ref left,
                    ref right,
                    ..
                } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }
        None
    }
}

//===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Checks the weight and leaf-size invariants of the whole tree, returning
    /// its length.
    pub(crate) fn check_node(node: &Node) -> usize {
        match *node {
            Node::Leaf(ref data) => {
                assert!(data.len() <= MAX_LEAF_SIZE, "leaf overflow");
                data.len()
            }
            Node::Internal {
                ref left,
                ref right,
                weight,
            } => {
                let l = check_node(left);
                let r = check_node(right);
                assert_eq!(weight, l, "weight must equal left length");
                assert!(l > 0 && r > 0, "internal node with an empty child");
                l + r
            }
        }
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn contents(node: &Node) -> String {
        node.leaves().flat_map(|leaf| leaf.iter()).collect()
    }

    #[test]
    fn build_small_is_leaf() {
        let node = Node::build(&chars("hello"));
        assert!(node.is_leaf());
        assert_eq!(node.len(), 5);
    }

    #[test]
    fn build_large_is_balanced() {
        let text = vec!['x'; MAX_LEAF_SIZE * 5 + 3];
        let node = Node::build(&text);
        assert_eq!(check_node(&node), text.len());
        assert_eq!(node.depth(), 4);
        let w = node.weight().unwrap();
        assert!(w == text.len() / 2);
    }

    #[test]
    fn char_at_01() {
        let mut text = vec!['a'; MAX_LEAF_SIZE];
        text.extend(vec!['b'; MAX_LEAF_SIZE]);
        let node = Node::build(&text);
        assert_eq!(node.char_at(0).unwrap(), 'a');
        assert_eq!(node.char_at(MAX_LEAF_SIZE - 1).unwrap(), 'a');
        assert_eq!(node.char_at(MAX_LEAF_SIZE).unwrap(), 'b');
        assert_eq!(node.char_at(2 * MAX_LEAF_SIZE - 1).unwrap(), 'b');
    }

    #[test]
    fn insert_splits_overfull_leaf() {
        let mut node = Node::new_leaf(&vec!['a'; MAX_LEAF_SIZE]);
        node.insert(0, 'b').unwrap();
        assert!(!node.is_leaf());
        assert_eq!(node.weight(), Some((MAX_LEAF_SIZE + 1) / 2));
        assert_eq!(check_node(&node), MAX_LEAF_SIZE + 1);
        assert_eq!(node.char_at(0).unwrap(), 'b');
    }

    #[test]
    fn insert_routes_by_weight() {
        let mut node = Node::new_internal(Node::new_leaf(&chars("ab")), Node::new_leaf(&chars("cd")));
        node.insert(1, 'x').unwrap();
        node.insert(3, 'y').unwrap();
        node.insert(6, 'z').unwrap();
        assert_eq!(contents(&node), "axbycdz");
        assert_eq!(node.weight(), Some(3));
        check_node(&node);
    }

    #[test]
    fn remove_promotes_sibling() {
        let mut node = Node::new_internal(Node::new_leaf(&chars("a")), Node::new_leaf(&chars("bc")));
        assert_eq!(node.remove(0).unwrap(), 'a');
        assert!(node.is_leaf());
        assert_eq!(contents(&node), "bc");

        let mut node = Node::new_internal(Node::new_leaf(&chars("ab")), Node::new_leaf(&chars("c")));
        assert_eq!(node.remove(2).unwrap(), 'c');
        assert!(node.is_leaf());
        assert_eq!(contents(&node), "ab");
    }

    #[test]
    fn remove_collapses_nested_subtree() {
        // Emptying a nested right subtree collapses it level by level.
        let right = Node::new_internal(Node::new_leaf(&chars("c")), Node::new_leaf(&chars("d")));
        let mut node = Node::new_internal(Node::new_leaf(&chars("ab")), right);
        assert_eq!(node.remove(3).unwrap(), 'd');
        assert_eq!(check_node(&node), 3);
        assert_eq!(node.remove(2).unwrap(), 'c');
        assert!(node.is_leaf());
        assert_eq!(contents(&node), "ab");

        let left = Node::new_internal(Node::new_leaf(&chars("a")), Node::new_leaf(&chars("b")));
        let mut node = Node::new_internal(left, Node::new_leaf(&chars("cd")));
        assert_eq!(node.remove(0).unwrap(), 'a');
        assert_eq!(node.remove(0).unwrap(), 'b');
        assert!(node.is_leaf());
        assert_eq!(contents(&node), "cd");
    }

    #[test]
    fn remove_keeps_small_leaves() {
        let mut node = Node::new_internal(Node::new_leaf(&chars("ab")), Node::new_leaf(&chars("cd")));
        assert_eq!(node.remove(1).unwrap(), 'b');
        assert!(!node.is_leaf());
        assert_eq!(node.weight(), Some(1));
        assert_eq!(contents(&node), "acd");
    }

    #[test]
    fn slice_into_01() {
        let mut text = chars("0123456789");
        text.extend(vec!['-'; MAX_LEAF_SIZE * 2]);
        text.extend(chars("abcdef"));
        let node = Node::build(&text);
        let n = text.len();

        let mut out = String::new();
        node.slice_into(2, 6, &mut out);
        assert_eq!(out, "2345");

        let mut out = String::new();
        node.slice_into(n - 4, n, &mut out);
        assert_eq!(out, "cdef");

        let mut out = String::new();
        node.slice_into(8, n - 5, &mut out);
        assert_eq!(out.chars().count(), n - 13);
        assert!(out.starts_with("89-"));
        assert!(out.ends_with("-a"));
    }

    #[test]
    fn leaves_in_order() {
        let node = Node::new_internal(
            Node::new_internal(Node::new_leaf(&chars("ab")), Node::new_leaf(&chars("cd"))),
            Node::new_leaf(&chars("ef")),
        );
        let leaves: Vec<String> = node.leaves().map(|l| l.iter().collect()).collect();
        assert_eq!(leaves, vec!["ab", "cd", "ef"]);
    }
}
