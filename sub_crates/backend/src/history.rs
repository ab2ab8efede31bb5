//! Operation-based undo/redo history.
//!
//! Every mutation made through the editor is recorded as one
//! `OperationRecord` per code point.  Records are grouped into `UndoAction`s,
//! which undo and redo by replaying the records against the rope in reverse.
//!
//! Two kinds of grouping exist:
//!
//! - Plain typing, backspacing and forward-deleting are coalesced while they
//!   stay contiguous, of the same kind, and no more than the group window
//!   apart.  The pending run becomes one action when it is flushed.
//! - Structural edits are bracketed with `begin_group()`/`end_group()`.
//!   Every action pushed inside the bracket shares a group id, and undo/redo
//!   moves the whole group at once.

use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::buffer::Rope;
use crate::config::DEFAULT_GROUP_WINDOW;
use crate::error::{invariant, Error, Result};

/// A (line, column) position, with the column counted in code points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Position {
        Position { line: line, col: col }
    }
}

/// One code point inserted into or removed from the text.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// Where the code point sits in the document it belongs to.
    pub at: Position,
    /// The position immediately after it.  Deleting (backspacing) here
    /// removes it again.
    pub after: Position,
    pub ch: char,
}

impl OperationRecord {
    pub fn new(at: Position, ch: char) -> OperationRecord {
        let after = if ch == '\n' {
            Position::new(at.line + 1, 0)
        } else {
            Position::new(at.line, at.col + 1)
        };
        OperationRecord {
            at: at,
            after: after,
            ch: ch,
        }
    }
}

/// The kind of a time-grouped micro-edit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EditKind {
    /// Typing a code point at the cursor.
    Insert,
    /// Removing the code point before the cursor.
    Backspace,
    /// Removing the code point at the cursor.
    Delete,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Insert,
    Delete,
}

pub type Records = SmallVec<[OperationRecord; 8]>;

/// An atomic, reversible step of history.
///
/// Records are kept in document order.  For insertions each record's `at` is
/// where it was inserted; for deletions it is where the code point sat before
/// the deletion, so re-inserting front to back restores the text.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoAction {
    pub direction: Direction,
    pub ops: Records,
    pub group: Option<u64>,
    /// Deletion made by backspacing: undoing it leaves the cursor after the
    /// restored text instead of before it.
    pub backspace: bool,
}

impl UndoAction {
    /// Reverts the action, returning where the cursor belongs afterwards.
    ///
    /// Either every record is reverted or, on error, none is.
    fn revert(&self, rope: &mut Rope) -> Result<Position> {
        let first = self.ops[0];
        let last = self.ops[self.ops.len() - 1];

        match self.direction {
            Direction::Insert => {
                delete_run(rope, &self.ops)?;
                Ok(first.at)
            }
            Direction::Delete => {
                insert_run(rope, &self.ops)?;
                Ok(if self.backspace { last.after } else { first.at })
            }
        }
    }

    /// Applies the action again, returning where the cursor belongs
    /// afterwards.
    fn reapply(&self, rope: &mut Rope) -> Result<Position> {
        let first = self.ops[0];
        let last = self.ops[self.ops.len() - 1];

        match self.direction {
            Direction::Insert => {
                insert_run(rope, &self.ops)?;
                Ok(last.after)
            }
            Direction::Delete => {
                delete_run(rope, &self.ops)?;
                Ok(first.at)
            }
        }
    }
}

fn out_of_sync(op: &OperationRecord) -> Error {
    Error::OutOfSync {
        line: op.at.line,
        col: op.at.col,
        ch: op.ch,
    }
}

/// Inserts `op.ch` at `op.at`, which must be an existing position.
fn insert_record(rope: &mut Rope, op: &OperationRecord) -> Result<()> {
    match rope.line_len(op.at.line) {
        Some(len) if op.at.col <= len => rope.insert(op.at.line, op.at.col, op.ch),
        _ => Err(out_of_sync(op)),
    }
}

/// Removes the code point at `op.at`, which must be `op.ch`.  The rope is
/// left untouched on error.
fn delete_record(rope: &mut Rope, op: &OperationRecord) -> Result<()> {
    let index = rope.index_of(op.after.line, op.after.col)?;
    if index > 0 {
        let (line, col) = rope.position_of(index - 1);
        if Position::new(line, col) != op.at || rope.char_at(index - 1)? != op.ch {
            return Err(out_of_sync(op));
        }
    }
    rope.delete(op.after.line, op.after.col)?;
    Ok(())
}

/// Inserts `ops` front to back.  If one fails, the ones already inserted are
/// removed again before the error is returned.
fn insert_run(rope: &mut Rope, ops: &[OperationRecord]) -> Result<()> {
    for (i, op) in ops.iter().enumerate() {
        if let Err(err) = insert_record(rope, op) {
            for done in ops[..i].iter().rev() {
                if delete_record(rope, done).is_err() {
                    return Err(invariant("could not undo a partial history replay"));
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Removes `ops` back to front, since removing a record shifts everything
/// recorded after it.  If one fails, the ones already removed are inserted
/// again before the error is returned.
fn delete_run(rope: &mut Rope, ops: &[OperationRecord]) -> Result<()> {
    for (i, op) in ops.iter().enumerate().rev() {
        if let Err(err) = delete_record(rope, op) {
            for done in ops[i + 1..].iter() {
                if insert_record(rope, done).is_err() {
                    return Err(invariant("could not undo a partial history replay"));
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// A run of micro-edits that has not been pushed onto the undo stack yet.
#[derive(Debug)]
struct Pending {
    kind: EditKind,
    ops: Records,
    /// Cursor position the next contiguous edit must start from.
    next: Position,
    last_edit: Instant,
}

impl Pending {
    fn new(kind: EditKind, op: OperationRecord, now: Instant) -> Pending {
        let mut ops = Records::new();
        ops.push(op);
        Pending {
            kind: kind,
            ops: ops,
            next: Pending::cursor_after(kind, &op),
            last_edit: now,
        }
    }

    fn cursor_after(kind: EditKind, op: &OperationRecord) -> Position {
        match kind {
            EditKind::Insert => op.after,
            EditKind::Backspace | EditKind::Delete => op.at,
        }
    }

    fn continues_with(&self, kind: EditKind, op: &OperationRecord) -> bool {
        if kind != self.kind {
            return false;
        }
        match kind {
            EditKind::Insert | EditKind::Delete => op.at == self.next,
            EditKind::Backspace => op.after == self.next,
        }
    }

    fn push(&mut self, op: OperationRecord, now: Instant) {
        match self.kind {
            EditKind::Insert => self.ops.push(op),
            // Each backspace removes the code point before the previous one.
            EditKind::Backspace => self.ops.insert(0, op),
            // Each forward delete removes the code point that followed the
            // previous one, so translate it back to where it originally sat.
            EditKind::Delete => {
                let prev = self.ops[self.ops.len() - 1];
                self.ops.push(OperationRecord::new(prev.after, op.ch));
            }
        }
        self.next = Pending::cursor_after(self.kind, &op);
        self.last_edit = now;
    }

    fn into_action(self, group: Option<u64>) -> UndoAction {
        UndoAction {
            direction: match self.kind {
                EditKind::Insert => Direction::Insert,
                EditKind::Backspace | EditKind::Delete => Direction::Delete,
            },
            ops: self.ops,
            group: group,
            backspace: self.kind == EditKind::Backspace,
        }
    }
}

/// Undo and redo stacks plus the grouping state feeding them.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<UndoAction>,
    redo_stack: Vec<UndoAction>,
    pending: Option<Pending>,
    window: Duration,

    group_depth: usize,
    current_group: Option<u64>,
    next_group_id: u64,
}

impl Default for History {
    fn default() -> History {
        History::new(DEFAULT_GROUP_WINDOW)
    }
}

impl History {
    /// Creates an empty history that coalesces micro-edits made no more than
    /// `window` apart.
    pub fn new(window: Duration) -> History {
        History {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            pending: None,
            window: window,
            group_depth: 0,
            current_group: None,
            next_group_id: 1,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.pending.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// The most recently pushed action, if any.
    pub fn last_action(&self) -> Option<&UndoAction> {
        self.undo_stack.last()
    }

    /// Opens an explicit group.  Everything recorded until the matching
    /// `end_group()` undoes and redoes as one step.  Groups nest; only the
    /// outermost bracket mints an id.
    pub fn begin_group(&mut self) -> u64 {
        if self.group_depth == 0 {
            self.flush_pending();
            self.current_group = Some(self.next_group_id);
            self.next_group_id += 1;
        }
        self.group_depth += 1;
        self.current_group.unwrap_or(0)
    }

    pub fn end_group(&mut self) {
        if self.group_depth == 0 {
            warn!("end_group() without a matching begin_group()");
            return;
        }
        self.group_depth -= 1;
        if self.group_depth == 0 {
            self.flush_pending();
            self.current_group = None;
        }
    }

    /// Records a micro-edit that was just applied to the rope.
    ///
    /// For `EditKind::Delete` the record is in the coordinates of the text it
    /// was removed from; consecutive forward deletes at the same cursor are
    /// translated back to their original positions.
    pub fn record(&mut self, kind: EditKind, op: OperationRecord) {
        self.record_at(kind, op, Instant::now());
    }

    /// Like `record()`, with an explicit timestamp.
    pub fn record_at(&mut self, kind: EditKind, op: OperationRecord, now: Instant) {
        self.redo_stack.clear();

        let in_group = self.group_depth > 0;
        let window = self.window;
        if let Some(ref mut pending) = self.pending {
            let in_window = now.saturating_duration_since(pending.last_edit) <= window;
            if pending.continues_with(kind, &op) && (in_group || in_window) {
                pending.push(op, now);
                return;
            }
        }

        self.flush_pending();
        self.pending = Some(Pending::new(kind, op, now));
    }

    /// Pushes a block of insertions as one action.
    pub fn push_insert_block<I>(&mut self, ops: I)
    where
        I: IntoIterator<Item = OperationRecord>,
    {
        self.push_block(Direction::Insert, ops.into_iter().collect(), false);
    }

    /// Pushes a block of deletions, in document order, as one action.
    pub fn push_delete_block<I>(&mut self, ops: I, backspace: bool)
    where
        I: IntoIterator<Item = OperationRecord>,
    {
        self.push_block(Direction::Delete, ops.into_iter().collect(), backspace);
    }

    fn push_block(&mut self, direction: Direction, ops: Records, backspace: bool) {
        if ops.is_empty() {
            return;
        }
        self.flush_pending();
        self.redo_stack.clear();
        self.undo_stack.push(UndoAction {
            direction: direction,
            ops: ops,
            group: self.current_group,
            backspace: backspace,
        });
    }

    /// Pushes the pending run of micro-edits, if any, onto the undo stack.
    ///
    /// Must happen before undo/redo and whenever editing yields to another
    /// mode.
    pub fn flush_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                kind = ?pending.kind,
                len = pending.ops.len(),
                group = ?self.current_group,
                "flushing pending edits"
            );
            let action = pending.into_action(self.current_group);
            self.undo_stack.push(action);
        }
    }

    /// Undoes the most recent action, or the whole group it belongs to.
    ///
    /// Returns the cursor position to restore, or `None` if there was
    /// nothing to undo.  If replaying fails, the rest of the group is not
    /// replayed, the actions already replayed are rolled back, and the error
    /// is returned with both the rope and the stacks as they were.
    pub fn undo(&mut self, rope: &mut Rope) -> Result<Option<Position>> {
        self.flush_pending();
        let cursor = History::transfer(
            &mut self.undo_stack,
            &mut self.redo_stack,
            rope,
            UndoAction::revert,
            UndoAction::reapply,
        )?;
        debug!(undo = self.undo_stack.len(), redo = self.redo_stack.len(), "undo");
        Ok(cursor)
    }

    /// Redoes the most recently undone action, or the whole group it belongs
    /// to.
    pub fn redo(&mut self, rope: &mut Rope) -> Result<Option<Position>> {
        self.flush_pending();
        let cursor = History::transfer(
            &mut self.redo_stack,
            &mut self.undo_stack,
            rope,
            UndoAction::reapply,
            UndoAction::revert,
        )?;
        debug!(undo = self.undo_stack.len(), redo = self.redo_stack.len(), "redo");
        Ok(cursor)
    }

    /// Pops actions off `from`, replays them and moves them onto `to`, until
    /// the top of `from` no longer belongs to the first action's group.
    ///
    /// If an action fails, the ones already moved are undone with `rollback`
    /// and put back, so a group is replayed completely or not at all.
    fn transfer<F, G>(
        from: &mut Vec<UndoAction>,
        to: &mut Vec<UndoAction>,
        rope: &mut Rope,
        replay: F,
        rollback: G,
    ) -> Result<Option<Position>>
    where
        F: Fn(&UndoAction, &mut Rope) -> Result<Position>,
        G: Fn(&UndoAction, &mut Rope) -> Result<Position>,
    {
        let group = match from.last() {
            Some(action) => action.group,
            None => return Ok(None),
        };

        let mut cursor = None;
        let mut moved = 0;
        while let Some(action) = from.pop() {
            match replay(&action, rope) {
                Ok(pos) => {
                    cursor = Some(pos);
                    to.push(action);
                    moved += 1;
                }
                Err(err) => {
                    warn!(%err, direction = ?action.direction, ?group, moved, "history replay failed");
                    from.push(action);
                    History::roll_back(to, from, moved, rope, rollback)?;
                    return Err(err);
                }
            }

            if group.is_none() || from.last().map(|a| a.group) != Some(group) {
                break;
            }
        }

        Ok(cursor)
    }

    /// Moves the last `count` actions of `to` back onto `from`, undoing each
    /// with `rollback`.
    fn roll_back<G>(
        to: &mut Vec<UndoAction>,
        from: &mut Vec<UndoAction>,
        count: usize,
        rope: &mut Rope,
        rollback: G,
    ) -> Result<()>
    where
        G: Fn(&UndoAction, &mut Rope) -> Result<Position>,
    {
        for _ in 0..count {
            let action = match to.pop() {
                Some(action) => action,
                None => return Err(invariant("history rollback ran out of actions")),
            };
            if rollback(&action, rope).is_err() {
                to.push(action);
                return Err(invariant("could not roll back a partial group replay"));
            }
            from.push(action);
        }
        Ok(())
    }
}

//===========================================================================
