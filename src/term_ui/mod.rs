mod screen;

use std::path::Path;
use std::time::Duration;

use crossterm::{
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    style::Color,
};
use tracing::{error, info, warn};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use backend::{Editor, Position};

use self::screen::{Screen, Style};

const EMPTY_MOD: KeyModifiers = KeyModifiers::empty();
const UPDATE_TICK_MS: u64 = 10;

// Color theme.
// Styles are (FG, BG).
const STYLE_MAIN: Style = Style(
    Color::Rgb {
        r: 0xD0,
        g: 0xD0,
        b: 0xD0,
    },
    Color::Rgb {
        r: 0x30,
        g: 0x30,
        b: 0x30,
    },
);
const STYLE_SELECT: Style = Style(
    Color::Rgb {
        r: 0xF0,
        g: 0xF0,
        b: 0xF0,
    },
    Color::Rgb {
        r: 0x3A,
        g: 0x50,
        b: 0x78,
    },
);
const STYLE_INFO: Style = Style(
    Color::Rgb {
        r: 0xC0,
        g: 0xC0,
        b: 0xC0,
    },
    Color::Rgb {
        r: 0x14,
        g: 0x14,
        b: 0x14,
    },
);

/// Generalized ui loop.
macro_rules! ui_loop {
    ($term_ui:ident,draw $draw:block,key_press($key:ident) $key_press:block) => {
        let mut stop = false;

        // Draw the editor to screen for the first time
        {
            $draw
        };
        $term_ui.screen.present()?;

        // UI loop
        loop {
            let mut should_redraw = false;

            // Handle input.  Drain everything that's already queued before
            // redrawing, so a burst of input (e.g. a terminal paste) doesn't
            // redraw once per key.
            while crossterm::event::poll(Duration::from_millis(UPDATE_TICK_MS))? {
                match crossterm::event::read()? {
                    Event::Key($key) => {
                        let (status, state_changed) = || -> (LoopStatus, bool) { $key_press }();
                        should_redraw |= state_changed;
                        if status == LoopStatus::Done {
                            stop = true;
                            break;
                        }
                    }

                    Event::Mouse(_) => {}

                    Event::Resize(w, h) => {
                        $term_ui.editor.flush();
                        $term_ui.width = w as usize;
                        $term_ui.height = h as usize;
                        $term_ui.screen.resize(w as usize, h as usize);
                        should_redraw = true;
                        break;
                    }
                }
            }

            // Check if we're done
            if stop || $term_ui.quit {
                break;
            }

            // Draw the editor to screen
            if should_redraw {
                $term_ui.scroll_to_cursor();
                {
                    $draw
                };
                $term_ui.screen.present()?;
            }
        }
    };
}

pub struct TermUI {
    screen: Screen,
    editor: Editor,
    width: usize,
    height: usize,
    // First visible line, and the first visible display column.
    view: (usize, usize),
    status: String,
    pending_command: Option<Command>,
    // Last search and replacement, offered again by the next prompt.
    query: String,
    replacement: String,
    // An error that means the document can't be trusted any more.
    fatal: Option<backend::Error>,
    quit: bool,
    quit_armed: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum LoopStatus {
    Done,
    Continue,
}

/// Commands that need a prompt, run between editing sessions.
#[derive(Debug, Copy, Clone, PartialEq)]
enum Command {
    Save,
    Find,
    ReplaceNext,
    ReplaceAll,
}

impl TermUI {
    pub fn new(editor: Editor) -> crossterm::Result<TermUI> {
        let screen = Screen::new()?;
        let (w, h) = crossterm::terminal::size()?;

        Ok(TermUI {
            screen: screen,
            editor: editor,
            width: w as usize,
            height: h as usize,
            view: (0, 0),
            status: String::new(),
            pending_command: None,
            query: String::new(),
            replacement: String::new(),
            fatal: None,
            quit: false,
            quit_armed: false,
        })
    }

    /// Runs until the user quits.  An internal error closes the editor and
    /// is returned.
    pub fn main_ui_loop(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while !self.quit {
            self.edit_loop()?;
            self.take_fatal()?;
            self.run_command()?;
            self.take_fatal()?;
        }
        Ok(())
    }

    fn take_fatal(&mut self) -> backend::Result<()> {
        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn edit_loop(&mut self) -> crossterm::Result<()> {
        self.scroll_to_cursor();

        // Start the UI
        ui_loop!(
            self,

            // Draw
            draw {
                self.draw_editor();
            },

            // Handle input
            key_press(key) {
                // Any key other than a repeated Ctrl-Q disarms the quit
                // confirmation.
                let quit_armed = self.quit_armed;
                self.quit_armed = false;
                let mut state_changed = true;

                // Shift extends the selection, plain movement drops it.
                if is_navigation(key.code) {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        self.editor.start_selection();
                    } else {
                        self.editor.clear_selection();
                    }
                }

                match key {
                    KeyEvent {
                        code: KeyCode::Char('q'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        if self.editor.is_dirty() && !quit_armed {
                            self.quit_armed = true;
                            self.status = "Unsaved changes. Press Ctrl-Q again to quit.".into();
                        } else {
                            self.quit = true;
                            return (LoopStatus::Done, true);
                        }
                    }

                    KeyEvent {
                        code: KeyCode::Char('s'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.pending_command = Some(Command::Save);
                        return (LoopStatus::Done, true);
                    }

                    KeyEvent {
                        code: KeyCode::Char('f'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.pending_command = Some(Command::Find);
                        return (LoopStatus::Done, true);
                    }

                    KeyEvent {
                        code: KeyCode::Char('r'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.pending_command = Some(Command::ReplaceAll);
                        return (LoopStatus::Done, true);
                    }

                    KeyEvent {
                        code: KeyCode::Char('t'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.pending_command = Some(Command::ReplaceNext);
                        return (LoopStatus::Done, true);
                    }

                    KeyEvent {
                        code: KeyCode::Char('n'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let query = self.query.clone();
                        if self.editor.find_next(&query).is_none() && !query.is_empty() {
                            self.status = format!("\"{}\" not found.", query);
                        }
                    }

                    KeyEvent {
                        code: KeyCode::Char('p'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let query = self.query.clone();
                        if self.editor.find_previous(&query).is_none() && !query.is_empty() {
                            self.status = format!("\"{}\" not found.", query);
                        }
                    }

                    KeyEvent {
                        code: KeyCode::Char('a'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.editor.select_all();
                    }

                    KeyEvent {
                        code: KeyCode::Char('c'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.copy();
                        self.report(result.map(|_| "Copied."));
                    }

                    KeyEvent {
                        code: KeyCode::Char('x'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.cut();
                        self.report(result.map(|_| "Cut."));
                    }

                    KeyEvent {
                        code: KeyCode::Char('v'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.paste();
                        self.report(result.map(|done| if done { "" } else { "Clipboard is empty." }));
                    }

                    KeyEvent {
                        code: KeyCode::Char('w'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.delete_word_left();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Delete,
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.delete_word_right();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::BackTab,
                        ..
                    } => {
                        let result = self.editor.unindent();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Char('z'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.undo();
                        self.report(result.map(|done| if done { "" } else { "Nothing to undo." }));
                    }

                    KeyEvent {
                        code: KeyCode::Char('y'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.redo();
                        self.report(result.map(|done| if done { "" } else { "Nothing to redo." }));
                    }

                    KeyEvent {
                        code: KeyCode::Char('d'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.duplicate_line();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Char('k'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.toggle_case();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Char('l'),
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        let result = self.editor.delete_line();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Up,
                        modifiers: KeyModifiers::ALT,
                    } => {
                        let result = self.editor.move_line_up();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Down,
                        modifiers: KeyModifiers::ALT,
                    } => {
                        let result = self.editor.move_line_down();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Up,
                        modifiers,
                    } if modifiers == KeyModifiers::CONTROL | KeyModifiers::ALT => {
                        self.editor.extend_cursors_up();
                    }

                    KeyEvent {
                        code: KeyCode::Down,
                        modifiers,
                    } if modifiers == KeyModifiers::CONTROL | KeyModifiers::ALT => {
                        self.editor.extend_cursors_down();
                    }

                    KeyEvent {
                        code: KeyCode::Esc,
                        modifiers: EMPTY_MOD,
                    } => {
                        self.editor.flush();
                        self.editor.clear_selection();
                        self.editor.clear_extra_cursors();
                        self.status.clear();
                    }

                    KeyEvent {
                        code: KeyCode::PageUp,
                        modifiers: EMPTY_MOD,
                    } => {
                        let rows = self.text_rows();
                        self.editor.move_up(rows);
                    }

                    KeyEvent {
                        code: KeyCode::PageDown,
                        modifiers: EMPTY_MOD,
                    } => {
                        let rows = self.text_rows();
                        self.editor.move_down(rows);
                    }

                    KeyEvent {
                        code: KeyCode::Up,
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        self.editor.move_up(1);
                    }

                    KeyEvent {
                        code: KeyCode::Up,
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.editor.move_up(8);
                    }

                    KeyEvent {
                        code: KeyCode::Down,
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        self.editor.move_down(1);
                    }

                    KeyEvent {
                        code: KeyCode::Down,
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.editor.move_down(8);
                    }

                    KeyEvent {
                        code: KeyCode::Left,
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        self.editor.move_left();
                    }

                    KeyEvent {
                        code: KeyCode::Right,
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        self.editor.move_right();
                    }

                    KeyEvent {
                        code: KeyCode::Home,
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        self.editor.move_line_start();
                    }

                    KeyEvent {
                        code: KeyCode::End,
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        self.editor.move_line_end();
                    }

                    KeyEvent {
                        code: KeyCode::Left,
                        modifiers,
                    } if modifiers.contains(KeyModifiers::CONTROL) && !modifiers.contains(KeyModifiers::ALT) => {
                        self.editor.move_word_left();
                    }

                    KeyEvent {
                        code: KeyCode::Right,
                        modifiers,
                    } if modifiers.contains(KeyModifiers::CONTROL) && !modifiers.contains(KeyModifiers::ALT) => {
                        self.editor.move_word_right();
                    }

                    KeyEvent {
                        code: KeyCode::Home,
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.editor.move_doc_start();
                    }

                    KeyEvent {
                        code: KeyCode::End,
                        modifiers: KeyModifiers::CONTROL,
                    } => {
                        self.editor.move_doc_end();
                    }

                    KeyEvent {
                        code: KeyCode::Enter,
                        modifiers: EMPTY_MOD,
                    } => {
                        let result = self.editor.insert_newline();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Tab,
                        modifiers: EMPTY_MOD,
                    } => {
                        let result = self.insert_soft_tab();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Backspace,
                        modifiers: EMPTY_MOD,
                    } => {
                        let result = self.editor.backspace();
                        self.report(result.map(|_| ""));
                    }

                    KeyEvent {
                        code: KeyCode::Delete,
                        modifiers: EMPTY_MOD,
                    } => {
                        let result = self.editor.delete_forward();
                        self.report(result.map(|_| ""));
                    }

                    // Character
                    KeyEvent {
                        code: KeyCode::Char(c),
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        let result = self.editor.insert_char(c);
                        self.report(result.map(|_| ""));
                    }

                    _ => {
                        state_changed = false;
                    }
                }

                if self.fatal.is_some() {
                    return (LoopStatus::Done, true);
                }
                (LoopStatus::Continue, state_changed)
            }
        );

        Ok(())
    }

    /// Runs the prompt-driven command whose key ended the last editing
    /// session, if any.
    fn run_command(&mut self) -> crossterm::Result<()> {
        let command = match self.pending_command.take() {
            Some(command) => command,
            None => return Ok(()),
        };
        self.editor.flush();

        match command {
            Command::Save => self.save()?,
            Command::Find => {
                if let Some(query) = self.prompt_query("Find: ")? {
                    match self.editor.find_next(&query) {
                        Some(_) => self.status.clear(),
                        None => self.status = format!("\"{}\" not found.", query),
                    }
                }
            }
            Command::ReplaceNext => {
                if let Some((query, replacement)) = self.prompt_replacement()? {
                    let result = self.editor.replace_next(&query, &replacement);
                    self.report(result.map(|found| match found {
                        Some(_) => String::new(),
                        None => format!("\"{}\" not found.", query),
                    }));
                }
            }
            Command::ReplaceAll => {
                if let Some((query, replacement)) = self.prompt_replacement()? {
                    let result = self.editor.replace_all(&query, &replacement);
                    self.report(result.map(|n| format!("Replaced {} occurrence(s).", n)));
                }
            }
        }
        Ok(())
    }

    /// Prompts for a search query, offering the last one.  An empty query is
    /// treated as a cancel.
    fn prompt_query(&mut self, prefix: &str) -> crossterm::Result<Option<String>> {
        let last = self.query.clone();
        match self.prompt(prefix, &last)? {
            Some(query) if !query.is_empty() => {
                self.query = query.clone();
                Ok(Some(query))
            }
            _ => Ok(None),
        }
    }

    /// Prompts for a query and its replacement.  The replacement may be
    /// empty.
    fn prompt_replacement(&mut self) -> crossterm::Result<Option<(String, String)>> {
        let query = match self.prompt_query("Replace: ")? {
            Some(query) => query,
            None => return Ok(None),
        };
        let last = self.replacement.clone();
        match self.prompt("With: ", &last)? {
            Some(replacement) => {
                self.replacement = replacement.clone();
                Ok(Some((query, replacement)))
            }
            None => Ok(None),
        }
    }

    fn save(&mut self) -> crossterm::Result<()> {
        let result = if self.editor.file_path().is_some() {
            self.editor.save()
        } else {
            match self.prompt("Save as: ", "")? {
                Some(ref name) if !name.is_empty() => self.editor.save_as(Path::new(name)),
                _ => return Ok(()),
            }
        };

        match result {
            Ok(bytes) => {
                info!(bytes, "saved from the ui");
                self.status = format!("Wrote {} bytes.", bytes);
            }
            Err(err) => self.report::<&str>(Err(err)),
        }
        Ok(())
    }

    /// Reads a line of input on the status row, starting from `initial`.
    /// Returns `None` only if the user cancels with Esc or Ctrl-Q; an empty
    /// line is a valid answer.
    fn prompt(&mut self, prefix: &str, initial: &str) -> crossterm::Result<Option<String>> {
        let mut cancel = false;
        let mut input = String::from(initial);

        ui_loop!(
            self,

            // Draw
            draw {
                self.draw_editor();
                let row = self.height.saturating_sub(1);
                for i in 0..self.width {
                    self.screen.draw(i, row, " ", STYLE_INFO);
                }
                self.screen.draw(1, row, prefix, STYLE_INFO);
                self.screen.draw(prefix.width() + 1, row, &input[..], STYLE_INFO);
                self.screen.set_cursor(prefix.width() + input.width() + 1, row);
            },

            // Handle input
            key_press(key) {
                let mut state_changed = true;
                match key {
                    KeyEvent {
                        code: KeyCode::Char('q'),
                        modifiers: KeyModifiers::CONTROL,
                    } | KeyEvent {
                        code: KeyCode::Esc,
                        modifiers: EMPTY_MOD,
                    } => {
                        cancel = true;
                        return (LoopStatus::Done, true);
                    }

                    KeyEvent {
                        code: KeyCode::Enter,
                        modifiers: EMPTY_MOD,
                    } => {
                        return (LoopStatus::Done, true);
                    }

                    KeyEvent {
                        code: KeyCode::Backspace,
                        modifiers: EMPTY_MOD,
                    } => {
                        input.pop();
                    }

                    // Character
                    KeyEvent {
                        code: KeyCode::Char(c),
                        modifiers,
                    } if modifiers == EMPTY_MOD || modifiers == KeyModifiers::SHIFT => {
                        input.push(c);
                    }

                    _ => {
                        state_changed = false;
                    }
                }

                (LoopStatus::Continue, state_changed)
            }
        );

        Ok(prompt_answer(input, cancel))
    }

    fn insert_soft_tab(&mut self) -> backend::Result<()> {
        let tab_width = self.editor.config().tab_width.max(1);
        let cursor = self.editor.cursor();
        let line = self.editor.buffer().line(cursor.line);
        let col = display_col(&line, cursor.col, tab_width);
        for _ in 0..(tab_width - col % tab_width) {
            self.editor.insert_char(' ')?;
        }
        Ok(())
    }

    /// Shows `message` or a recoverable error on the status line.  Any
    /// other error stops the editor.
    fn report<T: Into<String>>(&mut self, result: backend::Result<T>) {
        match status_for(result) {
            Ok(status) => self.status = status,
            Err(err) => {
                error!(%err, "internal error, closing the editor");
                self.fatal = Some(err);
            }
        }
    }

    fn text_rows(&self) -> usize {
        self.height.saturating_sub(1).max(1)
    }

    /// Scrolls the view just enough to keep the cursor on screen.
    fn scroll_to_cursor(&mut self) {
        let cursor = self.editor.cursor();
        let rows = self.text_rows();
        if cursor.line < self.view.0 {
            self.view.0 = cursor.line;
        } else if cursor.line >= self.view.0 + rows {
            self.view.0 = cursor.line + 1 - rows;
        }

        let tab_width = self.editor.config().tab_width.max(1);
        let line = self.editor.buffer().line(cursor.line);
        let x = display_col(&line, cursor.col, tab_width);
        let cols = self.width.max(1);
        if x < self.view.1 {
            self.view.1 = x;
        } else if x >= self.view.1 + cols {
            self.view.1 = x + 1 - cols;
        }
    }

    fn draw_editor(&self) {
        self.screen.clear(STYLE_MAIN.1);

        let tab_width = self.editor.config().tab_width.max(1);
        let buffer = self.editor.buffer();
        let cursor = self.editor.cursor();
        let selection = self.editor.selection();
        let (cursor_first, cursor_last) = self.editor.cursor_lines();
        let (first_line, first_col) = self.view;

        for row in 0..self.text_rows() {
            let line_idx = first_line + row;
            if line_idx >= buffer.line_count() {
                break;
            }
            let line = buffer.line(line_idx);
            let extra_cursor = if line_idx != cursor.line
                && cursor_first <= line_idx
                && line_idx <= cursor_last
            {
                Some(cursor.col.min(line.chars().count()))
            } else {
                None
            };

            let mut x = 0;
            let mut col = 0;
            for g in line.graphemes(true) {
                let width = if g == "\t" {
                    tab_width - x % tab_width
                } else {
                    g.width()
                };
                let style = if is_selected(selection, Position::new(line_idx, col))
                    || extra_cursor == Some(col)
                {
                    STYLE_SELECT
                } else {
                    STYLE_MAIN
                };
                if x >= first_col && x + width <= first_col + self.width {
                    if g == "\t" || g.chars().any(char::is_control) {
                        for i in 0..width {
                            self.screen.draw(x - first_col + i, row, " ", style);
                        }
                    } else {
                        self.screen.draw(x - first_col, row, g, style);
                    }
                }
                x += width;
                col += g.chars().count();
            }

            // An extra cursor past the end of its line.
            if extra_cursor == Some(col) && x >= first_col && x < first_col + self.width {
                self.screen.draw(x - first_col, row, " ", STYLE_SELECT);
            }

            if line_idx == cursor.line {
                let cx = display_col(&line, cursor.col, tab_width);
                if cx >= first_col {
                    self.screen.set_cursor(cx - first_col, row);
                }
            }
        }

        self.draw_status_line();
    }

    fn draw_status_line(&self) {
        let row = self.height.saturating_sub(1);
        for i in 0..self.width {
            self.screen.draw(i, row, " ", STYLE_INFO);
        }

        // Filename and dirty marker
        let name = match self.editor.file_path() {
            Some(path) => path.display().to_string(),
            None => "[untitled]".to_string(),
        };
        let dirty_char = if self.editor.is_dirty() { "*" } else { "" };
        let left = format!("{}{}  {}", name, dirty_char, self.status);
        self.screen.draw(1, row, &left, STYLE_INFO);

        let cursor = self.editor.cursor();
        let right = format!(
            "Ln {}, Col {}  {} lines",
            cursor.line + 1,
            cursor.col + 1,
            self.editor.buffer().line_count()
        );
        self.screen.draw(
            self.width.saturating_sub(right.len() + 1),
            row,
            &right,
            STYLE_INFO,
        );
    }
}

fn is_navigation(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Up
            | KeyCode::Down
            | KeyCode::Left
            | KeyCode::Right
            | KeyCode::Home
            | KeyCode::End
            | KeyCode::PageUp
            | KeyCode::PageDown
    )
}

fn is_selected(selection: Option<(Position, Position)>, pos: Position) -> bool {
    match selection {
        Some((start, end)) => start <= pos && pos < end,
        None => false,
    }
}

/// Only an explicit cancel discards the input.
fn prompt_answer(input: String, cancelled: bool) -> Option<String> {
    if cancelled {
        None
    } else {
        Some(input)
    }
}

/// Status line text for the outcome of an edit.  Errors that mean the
/// document can't be trusted any more are handed back instead.
fn status_for<T: Into<String>>(result: backend::Result<T>) -> Result<String, backend::Error> {
    match result {
        Ok(message) => Ok(message.into()),
        Err(err) if err.is_invariant_violation() => Err(err),
        Err(err) => {
            warn!(%err, "edit failed");
            Ok(format!("Error: {}", err))
        }
    }
}

/// Display column of code point `col` in `line`, with tabs expanded to the
/// next multiple of `tab_width`.
fn display_col(line: &str, col: usize, tab_width: usize) -> usize {
    line.chars().take(col).fold(0, |x, c| {
        if c == '\t' {
            x + tab_width - x % tab_width
        } else {
            x + c.width().unwrap_or(0)
        }
    })
}

//===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_col_01() {
        assert_eq!(display_col("hello", 3, 4), 3);
        assert_eq!(display_col("hello", 99, 4), 5);
        assert_eq!(display_col("", 0, 4), 0);
    }

    #[test]
    fn display_col_tabs() {
        assert_eq!(display_col("\tx", 1, 4), 4);
        assert_eq!(display_col("ab\tx", 3, 4), 4);
        assert_eq!(display_col("abcd\tx", 5, 4), 8);
        assert_eq!(display_col("\t\t", 2, 8), 16);
    }

    #[test]
    fn empty_prompt_answer_is_kept() {
        assert_eq!(prompt_answer(String::new(), false), Some(String::new()));
        assert_eq!(prompt_answer(String::from("abc"), false), Some(String::from("abc")));
        assert_eq!(prompt_answer(String::from("abc"), true), None);
    }

    #[test]
    fn recoverable_errors_become_status() {
        assert_eq!(status_for(Ok("done")).unwrap(), "done");
        assert_eq!(
            status_for::<&str>(Err(backend::Error::StartOfDocument)).unwrap(),
            "Error: nothing to delete at start of document"
        );
    }

    #[test]
    fn invariant_violations_are_handed_back() {
        match status_for::<&str>(Err(backend::Error::Invariant("stale weight"))) {
            Err(backend::Error::Invariant("stale weight")) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        let out_of_sync = backend::Error::OutOfSync {
            line: 0,
            col: 1,
            ch: 'x',
        };
        assert!(status_for::<&str>(Err(out_of_sync)).is_err());
    }

    #[test]
    fn selection_is_half_open() {
        let sel = Some((Position::new(0, 2), Position::new(1, 1)));
        assert!(!is_selected(sel, Position::new(0, 1)));
        assert!(is_selected(sel, Position::new(0, 2)));
        assert!(is_selected(sel, Position::new(0, 9)));
        assert!(is_selected(sel, Position::new(1, 0)));
        assert!(!is_selected(sel, Position::new(1, 1)));
        assert!(!is_selected(None, Position::new(0, 0)));
    }

    #[test]
    fn display_col_wide() {
        assert_eq!(display_col("世界x", 2, 4), 4);
        assert_eq!(display_col("e\u{301}x", 2, 4), 1);
    }
}
