//! A rope text buffer addressed by (line, column) in code points.
//!
//! The tree only splits leaves when they overflow.  Balance is maintained by a
//! coarse policy instead of a self-balancing tree: after each edit the sizes
//! of the root's two subtrees are compared, and if one outweighs the other by
//! more than `REBALANCE_THRESHOLD` the whole tree is flattened and rebuilt.
//! Imbalance deeper in the tree is only corrected once it shows up at the
//! root.

mod line_index;
mod node;

use std::fmt;
use std::io;

use tracing::debug;

use crate::error::{invariant, Error, Result};

use self::line_index::LineIndex;
use self::node::Node;

pub use self::node::{MAX_LEAF_SIZE, REBALANCE_THRESHOLD};

/// A document's text, stored as a binary tree of code point runs plus an
/// index of line starts.
///
/// An empty document has no tree and exactly one, empty, line.
#[derive(Debug, Clone)]
pub struct Rope {
    root: Option<Node>,
    len: usize,
    lines: LineIndex,
}

impl Default for Rope {
    fn default() -> Rope {
        Rope::new()
    }
}

impl Rope {
    /// Creates a new empty rope.
    pub fn new() -> Rope {
        Rope {
            root: None,
            len: 0,
            lines: LineIndex::new(),
        }
    }

    /// Creates a new rope from a string slice.
    pub fn from_str(text: &str) -> Rope {
        let chars: Vec<char> = text.chars().collect();
        let mut lines = LineIndex::new();
        lines.rebuild(std::iter::once(&chars[..]));

        Rope {
            root: if chars.is_empty() {
                None
            } else {
                Some(Node::build(&chars))
            },
            len: chars.len(),
            lines: lines,
        }
    }

    /// Total number of code points.
    pub fn len_chars(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of lines.  Always at least one.
    ///
    /// Runs in O(1) time.
    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    /// Length of `line` in code points, excluding its `'\n'` (but not a
    /// preceding `'\r'`).  This is the largest column `insert` and `delete`
    /// accept for the line.
    pub fn line_len(&self, line: usize) -> Option<usize> {
        let start = self.lines.line_start(line)?;
        let end = self.lines.line_end(line, self.len);
        if line + 1 < self.line_count() {
            Some(end - start - 1)
        } else {
            Some(end - start)
        }
    }

    /// Converts (line, col) to a global offset.  `col` is clamped to the
    /// line's length.
    pub fn index_of(&self, line: usize, col: usize) -> Result<usize> {
        match (self.lines.line_start(line), self.line_len(line)) {
            (Some(start), Some(len)) => Ok(start + col.min(len)),
            _ => Err(Error::Position { line, col }),
        }
    }

    /// Converts a global offset to (line, col).  Offsets past the end map to
    /// the end of the text.
    pub fn position_of(&self, index: usize) -> (usize, usize) {
        let index = index.min(self.len);
        let line = self.lines.find_line(index);
        let start = self.lines.line_start(line).unwrap_or(0);
        (line, index - start)
    }

    /// Inserts `c` at (line, col).
    ///
    /// The position is resolved before anything is touched, so on error the
    /// rope is unchanged.  Runs in O(log N) time, plus occasional O(N)
    /// rebuilds.
    pub fn insert(&mut self, line: usize, col: usize, c: char) -> Result<()> {
        let index = self.index_of(line, col)?;

        self.root
            .get_or_insert_with(|| Node::new_leaf(&[]))
            .insert(index, c)?;
        self.len += 1;
        self.lines.on_insert(index, c);

        if self.should_rebalance() {
            self.rebalance();
        }

        Ok(())
    }

    /// Deletes the code point immediately before (line, col), like a
    /// backspace, and returns it.
    ///
    /// Fails without touching the rope if the rope is empty, the position is
    /// invalid, or it resolves to the very start of the text.
    pub fn delete(&mut self, line: usize, col: usize) -> Result<char> {
        if self.len == 0 {
            return Err(Error::EmptyBuffer);
        }

        let index = self.index_of(line, col)?;
        if index == 0 {
            return Err(Error::StartOfDocument);
        }

        let index = index - 1;
        let c = match self.root {
            Some(ref mut root) => root.remove(index)?,
            None => return Err(invariant("non-empty rope without a root")),
        };
        self.len -= 1;
        if self.len == 0 {
            self.root = None;
        }
        self.lines.on_delete(index, c);

        if self.should_rebalance() {
            self.rebalance();
        }

        Ok(c)
    }

    /// Returns the contents of line `n` without its line ending.
    ///
    /// Out-of-range lines yield an empty string.  Runs in O(log N + K) time,
    /// where K is the length of the line.
    pub fn line(&self, n: usize) -> String {
        let root = match (self.root.as_ref(), self.lines.line_start(n)) {
            (Some(root), Some(_)) => root,
            _ => return String::new(),
        };

        let start = self.lines.line_start(n).unwrap_or(0);
        let mut end = self.lines.line_end(n, self.len);

        if end > start && matches!(root.char_at(end - 1), Ok('\n')) {
            end -= 1;
            if end > start && matches!(root.char_at(end - 1), Ok('\r')) {
                end -= 1;
            }
        }

        let mut text = String::with_capacity(end - start);
        root.slice_into(start, end, &mut text);
        text
    }

    /// Returns the text between global offsets `start` and `end`, clamped to
    /// the text.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.len);
        let mut text = String::new();
        if let Some(ref root) = self.root {
            if start < end {
                root.slice_into(start, end, &mut text);
            }
        }
        text
    }

    /// Returns the code point at global offset `index`.
    ///
    /// Runs in O(log N) time.
    pub fn char_at(&self, index: usize) -> Result<char> {
        match self.root {
            Some(ref root) if index < self.len => root.char_at(index),
            _ => Err(Error::Index {
                index,
                len: self.len,
            }),
        }
    }

    /// Iterates over the text in contiguous chunks, in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &[char]> + '_ {
        self.root.iter().flat_map(|root| root.leaves())
    }

    /// Writes the whole text to `sink` as UTF-8, one leaf at a time, and
    /// returns the number of bytes written.
    ///
    /// Stops at the first failed write; the error carries the number of bytes
    /// written before it.
    pub fn write_to<W: io::Write>(&self, sink: &mut W) -> Result<usize> {
        let mut written = 0;
        let mut buf = String::with_capacity(MAX_LEAF_SIZE * 4);

        for chunk in self.chunks() {
            buf.clear();
            buf.extend(chunk);
            if let Err(source) = sink.write_all(buf.as_bytes()) {
                return Err(Error::Write { written, source });
            }
            written += buf.len();
        }

        Ok(written)
    }

    /// True when one side of the root holds more than `REBALANCE_THRESHOLD`
    /// times as much text as the other.
    ///
    /// Runs in O(1) time.
    fn should_rebalance(&self) -> bool {
        let left = match self.root.as_ref().and_then(|root| root.weight()) {
            Some(weight) => weight,
            None => return false,
        };
        let right = self.len - left;

        if left == 0 || right == 0 {
            return false;
        }

        let ratio = left.max(right) as f64 / left.min(right) as f64;
        ratio > REBALANCE_THRESHOLD
    }

    /// Flattens the tree and rebuilds it, along with the line index.
    ///
    /// Runs in O(N) time.
    fn rebalance(&mut self) {
        let old_root = match self.root.take() {
            Some(root) => root,
            None => return,
        };

        let mut chars = Vec::with_capacity(self.len);
        for leaf in old_root.leaves() {
            chars.extend_from_slice(leaf);
        }

        let new_root = Node::build(&chars);
        debug!(
            len = self.len,
            old_depth = old_root.depth(),
            new_depth = new_root.depth(),
            "rebalanced rope"
        );

        self.lines.rebuild(std::iter::once(&chars[..]));
        self.root = Some(new_root);
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let len = self.root.as_ref().map(node::tests::check_node).unwrap_or(0);
        assert_eq!(len, self.len, "cached length is stale");
        if self.len == 0 {
            assert!(self.root.is_none(), "empty rope must not keep a tree");
        }

        let mut expected = LineIndex::new();
        expected.rebuild(self.chunks());
        assert_eq!(self.lines, expected, "line index is stale");
        assert_eq!(self.lines.starts()[0], 0);
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.root.as_ref().map(|root| root.depth()).unwrap_or(0)
    }
}

impl fmt::Display for Rope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = String::new();
        for chunk in self.chunks() {
            buf.clear();
            buf.extend(chunk);
            f.write_str(&buf)?;
        }
        Ok(())
    }
}

//===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn newline_count(rope: &Rope) -> usize {
        rope.chunks()
            .map(|chunk| chunk.iter().filter(|&&c| c == '\n').count())
            .sum()
    }

    struct FailAfter {
        budget: usize,
        out: Vec<u8>,
    }

    impl io::Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "sink full"));
            }
            self.budget -= 1;
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn new_01() {
        let rope = Rope::new();
        assert_eq!(rope.len_chars(), 0);
        assert_eq!(rope.line_count(), 1);
        assert_eq!(rope.line(0), "");
        assert_eq!(rope.to_string(), "");
        rope.check_invariants();
    }

    #[test]
    fn from_str_01() {
        let rope = Rope::from_str("Hello\r\nworld!\n");
        assert_eq!(rope.len_chars(), 14);
        assert_eq!(rope.line_count(), 3);
        assert_eq!(rope.line(0), "Hello");
        assert_eq!(rope.line(1), "world!");
        assert_eq!(rope.line(2), "");
        rope.check_invariants();
    }

    #[test]
    fn type_hello() {
        let mut rope = Rope::from_str("");
        for (i, c) in "hello".chars().enumerate() {
            rope.insert(0, i, c).unwrap();
        }
        assert_eq!(rope.line(0), "hello");
        assert_eq!(rope.line_count(), 1);
        rope.check_invariants();
    }

    #[test]
    fn insert_newline_splits_line() {
        let mut rope = Rope::from_str("hello");
        rope.insert(0, 2, '\n').unwrap();
        assert_eq!(rope.line_count(), 2);
        assert_eq!(rope.line(0), "he");
        assert_eq!(rope.line(1), "llo");
        rope.check_invariants();
    }

    #[test]
    fn insert_clamps_column() {
        let mut rope = Rope::from_str("ab\ncd");
        rope.insert(0, 99, 'x').unwrap();
        rope.insert(1, 99, 'y').unwrap();
        assert_eq!(rope.to_string(), "abx\ncdy");
        rope.check_invariants();
    }

    #[test]
    fn insert_bad_line_leaves_rope_untouched() {
        let mut rope = Rope::from_str("ab\ncd");
        match rope.insert(2, 0, 'x') {
            Err(Error::Position { line: 2, col: 0 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(rope.to_string(), "ab\ncd");
        rope.check_invariants();

        let mut empty = Rope::new();
        assert!(empty.insert(1, 0, 'x').is_err());
        assert!(empty.is_empty());
    }

    #[test]
    fn delete_joins_lines() {
        let mut rope = Rope::from_str("line1\nline2");
        assert_eq!(rope.delete(1, 0).unwrap(), '\n');
        assert_eq!(rope.line(0), "line1line2");
        assert_eq!(rope.line_count(), 1);
        rope.check_invariants();
    }

    #[test]
    fn delete_is_backspace() {
        let mut rope = Rope::from_str("abc");
        assert_eq!(rope.delete(0, 2).unwrap(), 'b');
        assert_eq!(rope.to_string(), "ac");
    }

    #[test]
    fn delete_at_start_is_refused() {
        let mut rope = Rope::from_str("abc");
        match rope.delete(0, 0) {
            Err(Error::StartOfDocument) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(rope.to_string(), "abc");

        let mut empty = Rope::new();
        match empty.delete(0, 0) {
            Err(Error::EmptyBuffer) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn delete_bad_line() {
        let mut rope = Rope::from_str("abc");
        match rope.delete(3, 1) {
            Err(Error::Position { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(rope.to_string(), "abc");
    }

    #[test]
    fn delete_everything() {
        let mut rope = Rope::from_str("a\nb");
        rope.delete(1, 1).unwrap();
        rope.delete(1, 0).unwrap();
        rope.delete(0, 1).unwrap();
        assert!(rope.is_empty());
        assert_eq!(rope.line_count(), 1);
        rope.check_invariants();

        rope.insert(0, 0, 'z').unwrap();
        assert_eq!(rope.to_string(), "z");
    }

    #[test]
    fn line_out_of_range() {
        let rope = Rope::from_str("a\nb");
        assert_eq!(rope.line(2), "");
        assert_eq!(rope.line(usize::MAX), "");
    }

    #[test]
    fn line_keeps_lone_cr() {
        let rope = Rope::from_str("a\rb\r\nc\r");
        assert_eq!(rope.line_count(), 2);
        assert_eq!(rope.line(0), "a\rb");
        assert_eq!(rope.line(1), "c\r");
    }

    #[test]
    fn char_at_01() {
        let rope = Rope::from_str("Hel世界lo");
        assert_eq!(rope.char_at(3).unwrap(), '世');
        assert_eq!(rope.char_at(6).unwrap(), 'o');
        match rope.char_at(7) {
            Err(Error::Index { index: 7, len: 7 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(Rope::new().char_at(0).is_err());
    }

    #[test]
    fn position_round_trip() {
        let rope = Rope::from_str("ab\ncde\n\nf");
        for index in 0..=rope.len_chars() {
            let (line, col) = rope.position_of(index);
            assert_eq!(rope.index_of(line, col).unwrap(), index);
        }
        assert_eq!(rope.position_of(3), (1, 0));
        assert_eq!(rope.position_of(100), (3, 1));
    }

    #[test]
    fn write_to_01() {
        let text = "Hello 世界!\nSecond line\n";
        let rope = Rope::from_str(text);
        let mut out = Vec::new();
        let written = rope.write_to(&mut out).unwrap();
        assert_eq!(written, text.len());
        assert_eq!(out, text.as_bytes());
    }

    #[test]
    fn write_to_reports_partial_count() {
        let text: String = std::iter::repeat('q').take(MAX_LEAF_SIZE * 3).collect();
        let rope = Rope::from_str(&text);
        let leaf_count = rope.chunks().count();
        assert!(leaf_count > 1);

        let mut sink = FailAfter {
            budget: 1,
            out: Vec::new(),
        };
        match rope.write_to(&mut sink) {
            Err(Error::Write { written, .. }) => {
                assert_eq!(written, sink.out.len());
                assert!(written > 0 && written < text.len());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn append_many_splits_and_rebalances() {
        let n = MAX_LEAF_SIZE * 3;
        let mut rope = Rope::new();
        for i in 0..n {
            rope.insert(0, i, 'a').unwrap();
        }
        rope.check_invariants();

        let mut out = Vec::new();
        rope.write_to(&mut out).unwrap();
        assert_eq!(out, vec![b'a'; n]);
        assert_eq!(rope.line_count(), 1);
        assert!(!rope.should_rebalance());
    }

    #[test]
    fn skewed_appends_keep_root_balanced() {
        // Only the root's two sides are kept in proportion.  Depth below
        // the root isn't bounded, so it is reported but not asserted on.
        let mut rope = Rope::new();
        let n = MAX_LEAF_SIZE * 16;
        let mut newlines = 0;
        for i in 0..n {
            let c = if i % 50 == 49 { '\n' } else { 'x' };
            let line = rope.line_count() - 1;
            let col = rope.line_len(line).unwrap();
            rope.insert(line, col, c).unwrap();
            if c == '\n' {
                newlines += 1;
            }

            assert!(!rope.should_rebalance(), "unbalanced root after {} appends", i + 1);
            assert_eq!(rope.line_count(), 1 + newlines);
            if i % MAX_LEAF_SIZE == 0 {
                rope.check_invariants();
            }
        }
        rope.check_invariants();
        assert_eq!(rope.line_count(), 1 + newline_count(&rope));
        println!("depth after {} appends: {}", n, rope.depth());
    }

    #[test]
    fn prepends_rebalance() {
        let mut rope = Rope::new();
        for _ in 0..(MAX_LEAF_SIZE * 4) {
            rope.insert(0, 0, 'p').unwrap();
        }
        rope.check_invariants();
        assert!(!rope.should_rebalance());
    }

    #[test]
    fn deletes_across_leaves() {
        let text: String = (0..MAX_LEAF_SIZE * 3)
            .map(|i| if i % 7 == 6 { '\n' } else { 'd' })
            .collect();
        let mut rope = Rope::from_str(&text);
        let mut model: Vec<char> = text.chars().collect();

        while !model.is_empty() {
            let index = model.len() / 3 + 1;
            let (line, col) = rope.position_of(index);
            let removed = rope.delete(line, col).unwrap();
            assert_eq!(removed, model.remove(index - 1));
            if model.len() % 97 == 0 {
                rope.check_invariants();
            }
        }
        rope.check_invariants();
        assert!(rope.is_empty());
    }
}
