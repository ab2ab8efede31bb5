/// Ordered start offsets of every line in the buffer.
///
/// This is the only authority for translating between (line, col) and global
/// code point offsets.  It always holds at least one entry, `starts[0] == 0`,
/// and entries are strictly increasing.  Only `'\n'` starts a new line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new() -> LineIndex {
        LineIndex { starts: vec![0] }
    }

    /// Rebuilds the index from scratch, scanning the chunks in document order.
    ///
    /// Runs in O(N) time.
    pub fn rebuild<'a, I>(&mut self, chunks: I)
    where
        I: IntoIterator<Item = &'a [char]>,
    {
        self.starts.clear();
        self.starts.push(0);

        let mut offset = 0;
        for chunk in chunks {
            for (i, &c) in chunk.iter().enumerate() {
                if c == '\n' {
                    self.starts.push(offset + i + 1);
                }
            }
            offset += chunk.len();
        }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.starts.get(line).copied()
    }

    /// Offset one past the last code point of `line`, including its line
    /// ending, given the total length of the text.
    pub fn line_end(&self, line: usize, total_len: usize) -> usize {
        self.starts.get(line + 1).copied().unwrap_or(total_len)
    }

    /// Returns the line containing the given offset, i.e. the last line whose
    /// start is at or before it.
    ///
    /// Runs in O(log L) time.
    pub fn find_line(&self, offset: usize) -> usize {
        // starts[0] == 0, so the partition point is at least 1.
        self.starts.partition_point(|&start| start <= offset) - 1
    }

    /// Updates the index after `c` was inserted at `offset`.
    pub fn on_insert(&mut self, offset: usize, c: char) {
        let line = self.find_line(offset);

        for start in self.starts[line + 1..].iter_mut() {
            *start += 1;
        }

        if c == '\n' {
            self.starts.insert(line + 1, offset + 1);
        }
    }

    /// Updates the index after `c` was removed from `offset`.
    pub fn on_delete(&mut self, offset: usize, c: char) {
        let line = self.find_line(offset);

        // The line that followed the removed line break merges into this one.
        if c == '\n' && line + 1 < self.starts.len() {
            self.starts.remove(line + 1);
        }

        for start in self.starts[line + 1..].iter_mut() {
            *start -= 1;
        }
    }

    #[cfg(test)]
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }
}

//===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(text: &str) -> LineIndex {
        let chars: Vec<char> = text.chars().collect();
        let mut index = LineIndex::new();
        index.rebuild(std::iter::once(&chars[..]));
        index
    }

    #[test]
    fn rebuild_01() {
        assert_eq!(index_of("").starts(), &[0]);
        assert_eq!(index_of("abc").starts(), &[0]);
        assert_eq!(index_of("ab\ncd\n").starts(), &[0, 3, 6]);
        assert_eq!(index_of("\n\n").starts(), &[0, 1, 2]);
    }

    #[test]
    fn rebuild_across_chunks() {
        let a: Vec<char> = "ab\nc".chars().collect();
        let b: Vec<char> = "d\ne".chars().collect();
        let mut index = LineIndex::new();
        index.rebuild(vec![&a[..], &b[..]]);
        assert_eq!(index.starts(), &[0, 3, 6]);
    }

    #[test]
    fn find_line_01() {
        let index = index_of("ab\ncd\nef");
        assert_eq!(index.find_line(0), 0);
        assert_eq!(index.find_line(2), 0);
        assert_eq!(index.find_line(3), 1);
        assert_eq!(index.find_line(5), 1);
        assert_eq!(index.find_line(6), 2);
        assert_eq!(index.find_line(100), 2);
    }

    #[test]
    fn insert_plain_char() {
        let mut index = index_of("ab\ncd");
        index.on_insert(1, 'x');
        assert_eq!(index, index_of("axb\ncd"));
    }

    #[test]
    fn insert_at_line_start() {
        let mut index = index_of("ab\ncd");
        index.on_insert(3, 'x');
        assert_eq!(index, index_of("ab\nxcd"));
    }

    #[test]
    fn insert_newline() {
        let mut index = index_of("hello\nworld");
        index.on_insert(2, '\n');
        assert_eq!(index, index_of("he\nllo\nworld"));

        index.on_insert(0, '\n');
        assert_eq!(index, index_of("\nhe\nllo\nworld"));
    }

    #[test]
    fn delete_plain_char() {
        let mut index = index_of("axb\ncd\ne");
        index.on_delete(1, 'x');
        assert_eq!(index, index_of("ab\ncd\ne"));
    }

    #[test]
    fn delete_newline() {
        let mut index = index_of("line1\nline2\nline3");
        index.on_delete(5, '\n');
        assert_eq!(index, index_of("line1line2\nline3"));
    }

    #[test]
    fn delete_trailing_newline() {
        let mut index = index_of("ab\n");
        index.on_delete(2, '\n');
        assert_eq!(index, index_of("ab"));
        assert_eq!(index.line_count(), 1);
    }

    #[test]
    fn line_end() {
        let index = index_of("ab\ncd");
        assert_eq!(index.line_end(0, 5), 3);
        assert_eq!(index.line_end(1, 5), 5);
    }
}
