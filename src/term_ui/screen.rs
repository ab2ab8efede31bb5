use std::cell::{Cell, RefCell};
use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// A grid of styled cells that is built up with `draw()` calls and then
/// written to the terminal in one go with `present()`.
///
/// Creating a `Screen` puts the terminal in raw mode on the alternate
/// screen; dropping it restores the terminal.
pub(crate) struct Screen {
    out: RefCell<BufWriter<io::Stdout>>,
    // `None` marks the cells covered by the right half of a wide grapheme.
    buf: RefCell<Vec<Option<(Style, String)>>>,
    cursor: Cell<Option<(usize, usize)>>,
    w: usize,
    h: usize,
}

impl Screen {
    pub(crate) fn new() -> crossterm::Result<Screen> {
        let (w, h) = terminal::size()?;
        terminal::enable_raw_mode()?;

        let mut out = BufWriter::with_capacity(1 << 14, io::stdout());
        queue!(out, EnterAlternateScreen, Hide)?;
        out.flush()?;

        let buf = std::iter::repeat(Some((Style(Color::Black, Color::Black), " ".into())))
            .take(w as usize * h as usize)
            .collect();
        Ok(Screen {
            out: RefCell::new(out),
            buf: RefCell::new(buf),
            cursor: Cell::new(None),
            w: w as usize,
            h: h as usize,
        })
    }

    pub(crate) fn clear(&self, col: Color) {
        for cell in self.buf.borrow_mut().iter_mut() {
            match *cell {
                Some((ref mut style, ref mut text)) => {
                    *style = Style(col, col);
                    text.clear();
                    text.push(' ');
                }
                _ => {
                    *cell = Some((Style(col, col), " ".into()));
                }
            }
        }
        self.cursor.set(None);
    }

    pub(crate) fn resize(&mut self, w: usize, h: usize) {
        self.w = w;
        self.h = h;
        self.buf
            .borrow_mut()
            .resize(w * h, Some((Style(Color::Black, Color::Black), " ".into())));
    }

    pub(crate) fn present(&self) -> crossterm::Result<()> {
        let mut out = self.out.borrow_mut();
        let buf = self.buf.borrow();

        let mut last_style = None;
        queue!(out, Hide)?;
        for y in 0..self.h {
            queue!(out, MoveTo(0, y as u16))?;
            for x in 0..self.w {
                if let Some((style, ref text)) = buf[y * self.w + x] {
                    if last_style != Some(style) {
                        queue!(out, SetForegroundColor(style.0), SetBackgroundColor(style.1))?;
                        last_style = Some(style);
                    }
                    queue!(out, Print(text))?;
                }
            }
        }

        if let Some((x, y)) = self.cursor.get() {
            queue!(out, MoveTo(x as u16, y as u16), Show)?;
        }

        out.flush()?;
        Ok(())
    }

    /// Draws `text` starting at cell (x, y), clipping at the screen edge.
    pub(crate) fn draw(&self, x: usize, y: usize, text: &str, style: Style) {
        if y < self.h {
            let mut buf = self.buf.borrow_mut();
            let mut x = x;
            for g in UnicodeSegmentation::graphemes(text, true) {
                let width = UnicodeWidthStr::width(g);
                if width > 0 {
                    if x < self.w {
                        buf[y * self.w + x] = Some((style, g.into()));
                    }
                    x += 1;
                    for _ in 0..(width - 1) {
                        if x < self.w {
                            buf[y * self.w + x] = None;
                        }
                        x += 1;
                    }
                }
            }
        }
    }

    /// Places the terminal cursor at (x, y) on the next `present()`.
    pub(crate) fn set_cursor(&self, x: usize, y: usize) {
        if x < self.w && y < self.h {
            self.cursor.set(Some((x, y)));
        }
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let mut out = self.out.borrow_mut();
        let _ = queue!(
            out,
            ResetColor,
            Clear(ClearType::All),
            Show,
            LeaveAlternateScreen
        );
        let _ = out.flush();
        let _ = terminal::disable_raw_mode();
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Style(pub Color, pub Color); // Fg, Bg
