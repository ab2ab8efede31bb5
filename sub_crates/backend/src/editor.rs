use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;
use unicode_segmentation::UnicodeSegmentation;

use crate::buffer::Rope;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::{EditKind, History, OperationRecord, Position};

/// An open document: its text, undo history and cursor.
///
/// Every change goes through `Rope::insert`/`Rope::delete` one code point at
/// a time and is recorded in the history.  Typing, backspacing and
/// forward-deleting are time-grouped; everything else is bracketed as an
/// explicit group so it undoes in one step.
///
/// The selection runs from `anchor` to the cursor.  Any edit drops it.
/// `cursor_span` stacks extra cursors in the cursor's column on the lines
/// below (positive) or above (negative) it.
#[derive(Debug)]
pub struct Editor {
    rope: Rope,
    history: History,
    cursor: Position,
    anchor: Option<Position>,
    cursor_span: isize,
    clipboard: String,
    config: Config,
    file_path: Option<PathBuf>,
    dirty: bool,
}

impl Editor {
    /// Creates a new blank editor.
    pub fn new(config: Config) -> Editor {
        Editor::with_rope(Rope::new(), config)
    }

    pub fn from_str(text: &str, config: Config) -> Editor {
        Editor::with_rope(Rope::from_str(text), config)
    }

    /// Opens the file at `path`.  A file that doesn't exist yet opens as an
    /// empty document and is created on save.
    pub fn open(path: &Path, config: Config) -> Result<Editor> {
        let rope = match fs::read_to_string(path) {
            Ok(text) => Rope::from_str(&text),
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => Rope::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), lines = rope.line_count(), "opened file");

        let mut editor = Editor::with_rope(rope, config);
        editor.file_path = Some(path.to_path_buf());
        Ok(editor)
    }

    fn with_rope(rope: Rope, config: Config) -> Editor {
        Editor {
            rope: rope,
            history: History::new(config.group_window),
            cursor: Position::default(),
            anchor: None,
            cursor_span: 0,
            clipboard: String::new(),
            config: config,
            file_path: None,
            dirty: false,
        }
    }

    /// Saves to the file the editor was opened from or last saved to,
    /// returning the number of bytes written.
    pub fn save(&mut self) -> Result<usize> {
        let path = match self.file_path {
            Some(ref path) => path.clone(),
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "no file name",
                )))
            }
        };
        self.save_as(&path)
    }

    pub fn save_as(&mut self, path: &Path) -> Result<usize> {
        self.history.flush_pending();

        let mut out = BufWriter::new(File::create(path)?);
        let written = self.rope.write_to(&mut out)?;
        out.flush()?;

        info!(path = %path.display(), bytes = written, "saved file");
        self.file_path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(written)
    }

    pub fn buffer(&self) -> &Rope {
        &self.rope
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cursor(&self) -> Position {
        self.cursor
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The whole text as a string.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn set_cursor(&mut self, line: usize, col: usize) {
        self.cursor = self.clamp(Position::new(line, col));
    }

    /// Pushes any pending typing/backspace/delete run onto the undo stack.
    /// Called when editing yields to another mode (escape, resize, prompts).
    pub fn flush(&mut self) {
        self.history.flush_pending();
    }

    //-----------------------------------------------------------------------
    // Time-grouped edits

    /// Types `c` at the cursor, or at every cursor of a multi-cursor block.
    pub fn insert_char(&mut self, c: char) -> Result<()> {
        if c == '\n' {
            return self.insert_newline();
        }
        self.anchor = None;
        if self.cursor_span != 0 {
            return self.insert_char_multi(c);
        }

        let at = self.clamp(self.cursor);
        self.rope.insert(at.line, at.col, c)?;

        let op = OperationRecord::new(at, c);
        self.history.record(EditKind::Insert, op);
        self.cursor = op.after;
        self.dirty = true;
        Ok(())
    }

    /// Removes the code point before the cursor, joining lines at column 0.
    /// Does nothing at the start of the document.  Removes the selection
    /// instead if there is one.
    pub fn backspace(&mut self) -> Result<()> {
        if self.selection().is_some() {
            return self.delete_selection().map(|_| ());
        }
        self.anchor = None;
        if self.cursor_span != 0 {
            return self.backspace_multi();
        }

        let at = self.clamp(self.cursor);
        let prev = if at.col > 0 {
            Position::new(at.line, at.col - 1)
        } else if at.line > 0 {
            Position::new(at.line - 1, self.line_len(at.line - 1))
        } else {
            return Ok(());
        };

        let c = self.rope.delete(at.line, at.col)?;
        self.history
            .record(EditKind::Backspace, OperationRecord::new(prev, c));
        self.cursor = prev;
        self.dirty = true;
        Ok(())
    }

    /// Removes the code point at the cursor, joining with the next line at
    /// the end of a line.  Does nothing at the end of the document.  Removes
    /// the selection instead if there is one.
    pub fn delete_forward(&mut self) -> Result<()> {
        if self.selection().is_some() {
            return self.delete_selection().map(|_| ());
        }
        self.anchor = None;

        let at = self.clamp(self.cursor);
        let index = self.rope.index_of(at.line, at.col)?;
        if index >= self.rope.len_chars() {
            return Ok(());
        }

        let op = OperationRecord::new(at, self.rope.char_at(index)?);
        self.rope.delete(op.after.line, op.after.col)?;
        self.history.record(EditKind::Delete, op);
        self.cursor = at;
        self.dirty = true;
        Ok(())
    }

    //-----------------------------------------------------------------------
    // Grouped edits

    /// Breaks the line at the cursor, copying the current line's leading
    /// whitespace when auto-indent is on.
    pub fn insert_newline(&mut self) -> Result<()> {
        self.cursor_span = 0;
        let at = self.clamp(self.cursor);
        let mut text = String::from("\n");
        if self.config.auto_indent {
            text.extend(
                self.rope
                    .line(at.line)
                    .chars()
                    .take(at.col)
                    .take_while(|&c| c == ' ' || c == '\t'),
            );
        }
        self.grouped(|ed| ed.insert_block(&text))
    }

    /// Inserts `text` at the cursor as a single undo step (paste).
    /// `"\r\n"` and lone `'\r'` line endings are inserted as `'\n'`.
    pub fn insert_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        self.grouped(|ed| ed.insert_block(&text))
    }

    /// Removes the cursor's line, line ending included.
    pub fn delete_line(&mut self) -> Result<()> {
        let line = self.clamp(self.cursor).line;
        let len = self.line_len(line);

        let (start, count) = if line + 1 < self.rope.line_count() {
            (Position::new(line, 0), len + 1)
        } else if line > 0 {
            // Last line: take the preceding line break instead.
            (Position::new(line - 1, self.line_len(line - 1)), len + 1)
        } else {
            (Position::new(0, 0), len)
        };

        if count > 0 {
            self.grouped(|ed| ed.delete_block(start, count))?;
        }
        self.cursor = self.clamp(Position::new(line, 0));
        Ok(())
    }

    /// Copies the cursor's line below itself and moves the cursor onto the
    /// copy.
    pub fn duplicate_line(&mut self) -> Result<()> {
        let at = self.clamp(self.cursor);
        let content = self.raw_line(at.line)?;

        self.grouped(|ed| {
            if at.line + 1 == ed.rope.line_count() {
                ed.cursor = Position::new(at.line, ed.line_len(at.line));
                ed.insert_block(&format!("\n{}", content))
            } else {
                ed.cursor = Position::new(at.line + 1, 0);
                ed.insert_block(&format!("{}\n", content))
            }
        })?;

        self.cursor = self.clamp(Position::new(at.line + 1, at.col));
        Ok(())
    }

    /// Swaps the cursor's line with the one above.  Returns false at the
    /// first line.
    pub fn move_line_up(&mut self) -> Result<bool> {
        let at = self.clamp(self.cursor);
        if at.line == 0 {
            return Ok(false);
        }
        self.swap_with_next(at.line - 1)?;
        self.cursor = self.clamp(Position::new(at.line - 1, at.col));
        Ok(true)
    }

    /// Swaps the cursor's line with the one below.  Returns false at the
    /// last line.
    pub fn move_line_down(&mut self) -> Result<bool> {
        let at = self.clamp(self.cursor);
        if at.line + 1 >= self.rope.line_count() {
            return Ok(false);
        }
        self.swap_with_next(at.line)?;
        self.cursor = self.clamp(Position::new(at.line + 1, at.col));
        Ok(true)
    }

    /// Cycles the case of the word under (or just left of) the cursor:
    /// lower → Title → UPPER → lower.  Mixed case becomes lower.
    ///
    /// Returns false when there is no word to change.
    pub fn toggle_case(&mut self) -> Result<bool> {
        let at = self.clamp(self.cursor);
        let line = self.raw_line(at.line)?;
        let (start, word) = match word_at(&line, at.col) {
            Some(found) => found,
            None => return Ok(false),
        };

        let replacement = next_case(word);
        if replacement == word {
            return Ok(false);
        }

        let count = word.chars().count();
        self.grouped(|ed| {
            ed.delete_block(Position::new(at.line, start), count)?;
            ed.insert_block(&replacement)
        })?;

        self.cursor = self.clamp(at);
        Ok(true)
    }

    /// Replaces every occurrence of `query` with `replacement` as a single
    /// undo step, returning how many were replaced.  Matches do not span
    /// lines.
    pub fn replace_all(&mut self, query: &str, replacement: &str) -> Result<usize> {
        let matches = self.find_all(query);
        if matches.is_empty() {
            return Ok(0);
        }

        let count = query.chars().count();
        let at = self.cursor;
        self.grouped(|ed| {
            // Back to front so earlier matches keep their positions.
            for pos in matches.iter().rev() {
                ed.delete_block(*pos, count)?;
                ed.insert_block(replacement)?;
            }
            Ok(())
        })?;

        info!(count = matches.len(), "replaced all");
        self.cursor = self.clamp(at);
        Ok(matches.len())
    }

    /// Replaces the first occurrence of `query` at or after the cursor,
    /// wrapping around the end of the document, then moves the cursor to the
    /// occurrence after it.  One undo step.
    ///
    /// Returns where the replaced text started, or `None` if there was no
    /// occurrence.
    pub fn replace_next(&mut self, query: &str, replacement: &str) -> Result<Option<Position>> {
        let at = self.clamp(self.cursor);
        let found = match self.search_forward(query, at, at.col) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let count = query.chars().count();
        self.grouped(|ed| {
            ed.delete_block(found, count)?;
            ed.insert_block(replacement)
        })?;

        let after = self.cursor;
        if let Some(next) = self.search_forward(query, after, after.col) {
            self.cursor = next;
        }
        Ok(Some(found))
    }

    /// Removes from the cursor back to the start of the word before it.
    /// Removes the selection instead if there is one.
    pub fn delete_word_left(&mut self) -> Result<bool> {
        if self.selection().is_some() {
            return self.delete_selection();
        }
        let end = self.clamp(self.cursor);
        let start = self.word_left(end);
        self.delete_range(start, end)
    }

    /// Removes from the cursor up to the start of the next word.  Removes the
    /// selection instead if there is one.
    pub fn delete_word_right(&mut self) -> Result<bool> {
        if self.selection().is_some() {
            return self.delete_selection();
        }
        let start = self.clamp(self.cursor);
        let end = self.word_right(start);
        self.delete_range(start, end)
    }

    /// Removes one level of indentation, a tab or up to `tab_width` spaces,
    /// from the cursor's line or from every line of a multi-cursor block.
    ///
    /// Returns false when none of the lines was indented.
    pub fn unindent(&mut self) -> Result<bool> {
        let at = self.clamp(self.cursor);
        let (first, last) = self.cursor_lines();
        let tab_width = self.config.tab_width;

        let mut indents = Vec::new();
        for line in first..=last {
            let text = self.raw_line(line)?;
            let count = match text.chars().next() {
                Some('\t') => 1,
                Some(' ') => text.chars().take(tab_width).take_while(|&c| c == ' ').count(),
                _ => 0,
            };
            if count > 0 {
                indents.push((line, count));
            }
        }
        if indents.is_empty() {
            return Ok(false);
        }

        self.grouped(|ed| {
            for &(line, count) in indents.iter() {
                ed.delete_block(Position::new(line, 0), count)?;
            }
            Ok(())
        })?;

        let removed = indents
            .iter()
            .find(|&&(line, _)| line == at.line)
            .map_or(0, |&(_, count)| count);
        self.cursor = Position::new(at.line, at.col.saturating_sub(removed));
        Ok(true)
    }

    //-----------------------------------------------------------------------
    // Selection and clipboard

    /// The selected range in document order, if it is not empty.
    pub fn selection(&self) -> Option<(Position, Position)> {
        let anchor = self.clamp(self.anchor?);
        let cursor = self.clamp(self.cursor);
        if anchor < cursor {
            Some((anchor, cursor))
        } else if cursor < anchor {
            Some((cursor, anchor))
        } else {
            None
        }
    }

    pub fn selected_text(&self) -> Option<String> {
        let (start, end) = self.selection()?;
        let start = self.rope.index_of(start.line, start.col).ok()?;
        let end = self.rope.index_of(end.line, end.col).ok()?;
        Some(self.rope.slice(start, end))
    }

    /// Anchors a selection at the cursor, unless one is already anchored.
    /// Moving the cursor afterwards extends it.
    pub fn start_selection(&mut self) {
        if self.anchor.is_none() {
            self.anchor = Some(self.clamp(self.cursor));
        }
    }

    pub fn clear_selection(&mut self) {
        self.anchor = None;
    }

    pub fn select_all(&mut self) {
        self.cursor_span = 0;
        self.anchor = Some(Position::default());
        self.move_doc_end();
    }

    /// Removes the selected text as one undo step, leaving the cursor where
    /// it started.  Returns false when nothing is selected.
    pub fn delete_selection(&mut self) -> Result<bool> {
        match self.selection() {
            Some((start, end)) => self.delete_range(start, end),
            None => {
                self.anchor = None;
                Ok(false)
            }
        }
    }

    /// Copies the selection, or the cursor's line and its line break, to the
    /// clipboard.
    pub fn copy(&mut self) -> Result<()> {
        self.clipboard = match self.selected_text() {
            Some(text) => text,
            None => format!("{}\n", self.raw_line(self.clamp(self.cursor).line)?),
        };
        Ok(())
    }

    /// Like `copy()`, then removes what was copied as one undo step.
    pub fn cut(&mut self) -> Result<()> {
        self.copy()?;
        if self.selection().is_some() {
            self.delete_selection()?;
        } else {
            self.delete_line()?;
        }
        Ok(())
    }

    /// Inserts the clipboard at the cursor, replacing the selection.  One
    /// undo step.  Returns false when the clipboard is empty.
    pub fn paste(&mut self) -> Result<bool> {
        if self.clipboard.is_empty() {
            return Ok(false);
        }
        let text = self.clipboard.clone();
        self.grouped(|ed| {
            ed.delete_selection()?;
            ed.insert_text(&text)
        })?;
        Ok(true)
    }

    pub fn clipboard(&self) -> &str {
        &self.clipboard
    }

    //-----------------------------------------------------------------------
    // Multiple cursors

    /// Adds a cursor in the same column on the line below the block.
    /// Returns false at the last line.
    pub fn extend_cursors_down(&mut self) -> bool {
        let line = self.clamp(self.cursor).line as isize;
        if line + self.cursor_span + 1 >= self.rope.line_count() as isize {
            return false;
        }
        self.cursor_span += 1;
        true
    }

    /// Adds a cursor in the same column on the line above the block.
    /// Returns false at the first line.
    pub fn extend_cursors_up(&mut self) -> bool {
        let line = self.clamp(self.cursor).line as isize;
        if line + self.cursor_span - 1 < 0 {
            return false;
        }
        self.cursor_span -= 1;
        true
    }

    pub fn clear_extra_cursors(&mut self) {
        self.cursor_span = 0;
    }

    /// First and last line holding a cursor.
    pub fn cursor_lines(&self) -> (usize, usize) {
        let line = self.clamp(self.cursor).line;
        let last = self.rope.line_count() - 1;
        if self.cursor_span >= 0 {
            (line, (line + self.cursor_span as usize).min(last))
        } else {
            (line.saturating_sub((-self.cursor_span) as usize), line)
        }
    }

    //-----------------------------------------------------------------------
    // Undo/redo

    /// Undoes the last step.  Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.anchor = None;
        match self.history.undo(&mut self.rope)? {
            Some(pos) => {
                self.cursor = self.clamp(pos);
                self.dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Redoes the last undone step.  Returns false if there was nothing to
    /// redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.anchor = None;
        match self.history.redo(&mut self.rope)? {
            Some(pos) => {
                self.cursor = self.clamp(pos);
                self.dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    //-----------------------------------------------------------------------
    // Navigation

    pub fn move_left(&mut self) {
        let at = self.clamp(self.cursor);
        self.cursor = if at.col > 0 {
            Position::new(at.line, at.col - 1)
        } else if at.line > 0 {
            Position::new(at.line - 1, self.line_len(at.line - 1))
        } else {
            at
        };
    }

    pub fn move_right(&mut self) {
        let at = self.clamp(self.cursor);
        self.cursor = if at.col < self.line_len(at.line) {
            Position::new(at.line, at.col + 1)
        } else if at.line + 1 < self.rope.line_count() {
            Position::new(at.line + 1, 0)
        } else {
            at
        };
    }

    pub fn move_up(&mut self, n: usize) {
        let at = self.cursor;
        self.cursor = self.clamp(Position::new(at.line.saturating_sub(n), at.col));
    }

    pub fn move_down(&mut self, n: usize) {
        let at = self.cursor;
        self.cursor = self.clamp(Position::new(at.line.saturating_add(n), at.col));
    }

    pub fn move_line_start(&mut self) {
        self.cursor.col = 0;
    }

    pub fn move_line_end(&mut self) {
        let line = self.clamp(self.cursor).line;
        self.cursor = Position::new(line, self.line_len(line));
    }

    pub fn move_doc_start(&mut self) {
        self.cursor = Position::default();
    }

    pub fn move_doc_end(&mut self) {
        let line = self.rope.line_count() - 1;
        self.cursor = Position::new(line, self.line_len(line));
    }

    pub fn move_word_left(&mut self) {
        let at = self.clamp(self.cursor);
        self.cursor = self.word_left(at);
    }

    pub fn move_word_right(&mut self) {
        let at = self.clamp(self.cursor);
        self.cursor = self.word_right(at);
    }

    /// Moves the cursor to the next occurrence of `query` after it, wrapping
    /// around the end of the document.
    pub fn find_next(&mut self, query: &str) -> Option<Position> {
        self.history.flush_pending();
        let at = self.clamp(self.cursor);
        let found = self.search_forward(query, at, at.col + 1)?;
        self.cursor = found;
        Some(found)
    }

    /// Moves the cursor to the closest occurrence of `query` before it,
    /// wrapping around the start of the document.
    pub fn find_previous(&mut self, query: &str) -> Option<Position> {
        let needle: Vec<char> = query.chars().collect();
        if needle.is_empty() {
            return None;
        }
        self.history.flush_pending();

        let at = self.clamp(self.cursor);
        let line_count = self.rope.line_count();
        for step in 0..=line_count {
            let line = (at.line + line_count - step % line_count) % line_count;
            let hay: Vec<char> = self.rope.line(line).chars().collect();
            let before = if step == 0 { at.col } else { hay.len() + 1 };

            if let Some(col) = rfind_in(&hay, &needle, before) {
                self.cursor = Position::new(line, col);
                return Some(self.cursor);
            }
        }

        None
    }

    /// Every non-overlapping occurrence of `query`, in document order.
    pub fn find_all(&self, query: &str) -> Vec<Position> {
        let needle: Vec<char> = query.chars().collect();
        let mut found = Vec::new();
        if needle.is_empty() {
            return found;
        }

        for line in 0..self.rope.line_count() {
            let hay: Vec<char> = self.rope.line(line).chars().collect();
            let mut from = 0;
            while let Some(col) = find_in(&hay, &needle, from) {
                found.push(Position::new(line, col));
                from = col + needle.len();
            }
        }

        found
    }

    //-----------------------------------------------------------------------
    // Helpers

    fn line_len(&self, line: usize) -> usize {
        self.rope.line_len(line).unwrap_or(0)
    }

    fn clamp(&self, pos: Position) -> Position {
        let line = pos.line.min(self.rope.line_count() - 1);
        Position::new(line, pos.col.min(self.line_len(line)))
    }

    /// A line's text up to, but not including, its `'\n'`.
    fn raw_line(&self, line: usize) -> Result<String> {
        let start = self.rope.index_of(line, 0)?;
        Ok(self.rope.slice(start, start + self.line_len(line)))
    }

    fn line_chars(&self, line: usize) -> Vec<char> {
        self.raw_line(line)
            .map(|text| text.chars().collect())
            .unwrap_or_default()
    }

    /// First occurrence of `query` from column `from` of `at`'s line onwards,
    /// wrapping around the end of the document.
    fn search_forward(&self, query: &str, at: Position, from: usize) -> Option<Position> {
        let needle: Vec<char> = query.chars().collect();
        if needle.is_empty() {
            return None;
        }

        let line_count = self.rope.line_count();
        for step in 0..=line_count {
            let line = (at.line + step) % line_count;
            let hay: Vec<char> = self.rope.line(line).chars().collect();
            let start = if step == 0 { from } else { 0 };

            if let Some(col) = find_in(&hay, &needle, start) {
                if step == line_count && col >= from {
                    break;
                }
                return Some(Position::new(line, col));
            }
        }

        None
    }

    /// Start of the word before `at`, skipping whitespace first.  At column 0
    /// this is the end of the previous line.
    fn word_left(&self, at: Position) -> Position {
        if at.col == 0 {
            return if at.line > 0 {
                Position::new(at.line - 1, self.line_len(at.line - 1))
            } else {
                at
            };
        }

        let chars = self.line_chars(at.line);
        let mut x = at.col.min(chars.len());
        while x > 0 && chars[x - 1].is_whitespace() {
            x -= 1;
        }
        if x > 0 {
            let word = is_word_char(chars[x - 1]);
            while x > 0 && !chars[x - 1].is_whitespace() && is_word_char(chars[x - 1]) == word {
                x -= 1;
            }
        }
        Position::new(at.line, x)
    }

    /// Start of the next word after `at`: the rest of the word or punctuation
    /// run under it, then any whitespace.  At the end of a line this moves
    /// onto the next one first.
    fn word_right(&self, at: Position) -> Position {
        let mut line = at.line;
        let mut chars = self.line_chars(line);
        let mut x = at.col;
        if x >= chars.len() {
            if line + 1 >= self.rope.line_count() {
                return at;
            }
            line += 1;
            chars = self.line_chars(line);
            x = 0;
        }

        if x < chars.len() && !chars[x].is_whitespace() {
            let word = is_word_char(chars[x]);
            while x < chars.len() && !chars[x].is_whitespace() && is_word_char(chars[x]) == word {
                x += 1;
            }
        }
        while x < chars.len() && chars[x].is_whitespace() {
            x += 1;
        }
        Position::new(line, x)
    }

    /// Removes the text between two positions as one undo step.
    fn delete_range(&mut self, start: Position, end: Position) -> Result<bool> {
        let first = self.rope.index_of(start.line, start.col)?;
        let last = self.rope.index_of(end.line, end.col)?;
        if last <= first {
            return Ok(false);
        }
        self.grouped(|ed| ed.delete_block(start, last - first))?;
        Ok(true)
    }

    /// Types `c` at the cursor's column on every line of the block, clamped
    /// to each line's length.  Each keystroke is one undo step.
    fn insert_char_multi(&mut self, c: char) -> Result<()> {
        let at = self.clamp(self.cursor);
        let (first, last) = self.cursor_lines();

        self.grouped(|ed| {
            let mut ops = Vec::with_capacity(last - first + 1);
            let mut result = Ok(());
            for line in first..=last {
                let pos = Position::new(line, at.col.min(ed.line_len(line)));
                if let Err(err) = ed.rope.insert(pos.line, pos.col, c) {
                    result = Err(err);
                    break;
                }
                ops.push(OperationRecord::new(pos, c));
            }
            if !ops.is_empty() {
                ed.dirty = true;
            }
            ed.history.push_insert_block(ops);
            result
        })?;

        self.cursor = Position::new(at.line, at.col + 1);
        Ok(())
    }

    /// Backspaces at the cursor's column on every line of the block.  Lines
    /// are never joined, so cursors at column 0 do nothing.
    fn backspace_multi(&mut self) -> Result<()> {
        let at = self.clamp(self.cursor);
        let (first, last) = self.cursor_lines();
        if at.col == 0 {
            return Ok(());
        }

        self.grouped(|ed| {
            let mut ops = Vec::with_capacity(last - first + 1);
            let mut result = Ok(());
            for line in (first..=last).rev() {
                let col = at.col.min(ed.line_len(line));
                if col == 0 {
                    continue;
                }
                match ed.rope.delete(line, col) {
                    Ok(c) => ops.push(OperationRecord::new(Position::new(line, col - 1), c)),
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }
            if !ops.is_empty() {
                ed.dirty = true;
            }
            // Collected bottom up.
            ops.reverse();
            ed.history.push_delete_block(ops, true);
            result
        })?;

        self.cursor = Position::new(at.line, at.col - 1);
        Ok(())
    }

    fn grouped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Editor) -> Result<T>,
    {
        self.history.begin_group();
        let result = f(self);
        self.history.end_group();
        result
    }

    /// Inserts `text` at the cursor as one history block, leaving the cursor
    /// after it.  Whatever was inserted before a failure is still recorded.
    fn insert_block(&mut self, text: &str) -> Result<()> {
        let mut ops = Vec::with_capacity(text.len());
        let mut result = Ok(());

        self.anchor = None;
        self.cursor = self.clamp(self.cursor);
        for c in text.chars() {
            let at = self.cursor;
            if let Err(err) = self.rope.insert(at.line, at.col, c) {
                result = Err(err);
                break;
            }
            let op = OperationRecord::new(at, c);
            self.cursor = op.after;
            ops.push(op);
        }

        if !ops.is_empty() {
            self.dirty = true;
        }
        self.history.push_insert_block(ops);
        result
    }

    /// Deletes up to `count` code points starting at `start` as one history
    /// block, leaving the cursor at `start`.
    fn delete_block(&mut self, start: Position, count: usize) -> Result<()> {
        self.anchor = None;
        let first = self.rope.index_of(start.line, start.col)?;
        let end = (first + count).min(self.rope.len_chars());

        let mut ops = Vec::with_capacity(end - first);
        for index in first..end {
            let (line, col) = self.rope.position_of(index);
            ops.push(OperationRecord::new(
                Position::new(line, col),
                self.rope.char_at(index)?,
            ));
        }

        // Back to front, so the recorded positions stay valid.
        let mut deleted = 0;
        let mut result = Ok(());
        for op in ops.iter().rev() {
            if let Err(err) = self.rope.delete(op.after.line, op.after.col) {
                result = Err(err);
                break;
            }
            deleted += 1;
        }

        if deleted > 0 {
            self.dirty = true;
        }
        let kept = ops.len() - deleted;
        self.history.push_delete_block(ops.drain(kept..), false);
        self.cursor = start;
        result
    }

    fn swap_with_next(&mut self, line: usize) -> Result<()> {
        let next = self.raw_line(line + 1)?;
        let len = self.line_len(line);
        let next_len = next.chars().count();

        self.grouped(|ed| {
            ed.delete_block(Position::new(line, len), next_len + 1)?;
            ed.cursor = Position::new(line, 0);
            ed.insert_block(&format!("{}\n", next))
        })
    }
}

/// Finds the first occurrence of `needle` in `hay` at or after `from`.
fn find_in(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()] == *needle)
}

/// Finds the last occurrence of `needle` in `hay` starting before `before`.
fn rfind_in(hay: &[char], needle: &[char], before: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    let last = (hay.len() - needle.len()).min(before.checked_sub(1)?);
    (0..=last)
        .rev()
        .find(|&i| hay[i..i + needle.len()] == *needle)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Finds the word containing column `col`, or failing that the word ending
/// right at it.  Returns its start column and text.
fn word_at(line: &str, col: usize) -> Option<(usize, &str)> {
    let mut start = 0;
    let mut ending_here = None;

    for segment in line.split_word_bounds() {
        let end = start + segment.chars().count();
        if segment.chars().any(|c| c.is_alphanumeric()) {
            if start <= col && col < end {
                return Some((start, segment));
            }
            if end == col {
                ending_here = Some((start, segment));
            }
        }
        if end > col {
            break;
        }
        start = end;
    }

    ending_here
}

fn next_case(word: &str) -> String {
    let lower = word.to_lowercase();
    if word == lower {
        return title_case(word);
    }
    if word == word.to_uppercase() {
        return lower;
    }
    if is_title_case(word) {
        return word.to_uppercase();
    }
    lower
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn is_title_case(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let rest = chars.as_str();
            !rest.is_empty() && rest == rest.to_lowercase()
        }
        _ => false,
    }
}

//===========================================================================
