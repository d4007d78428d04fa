//! Console renderer using crossterm
//!
//! [`ConsoleView`] is the presentation sink: a scrollback of styled lines
//! plus the input line. [`Renderer`] draws a view to the terminal.

use std::collections::VecDeque;
use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::config::{ColorScheme, SCROLLBACK_LIMIT};
use crate::core::session::{OutputStyle, PresentationSink};

/// Prompt shown before the input line
const PROMPT: &str = "> ";

/// Tab stop width used when drawing
const TAB_WIDTH: usize = 4;

/// A run of text in one style
pub type Segment = (String, OutputStyle);

/// One logical scrollback line
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyledLine {
    pub segments: Vec<Segment>,
}

impl StyledLine {
    fn push(&mut self, text: &str, style: OutputStyle) {
        match self.segments.last_mut() {
            Some((last, s)) if *s == style => last.push_str(text),
            _ => self.segments.push((text.to_string(), style)),
        }
    }

    /// Plain text of the line
    pub fn text(&self) -> String {
        self.segments.iter().map(|(t, _)| t.as_str()).collect()
    }
}

/// Scrollback and input line state
pub struct ConsoleView {
    /// Logical lines, the last one still open for appends
    lines: VecDeque<StyledLine>,
    /// Input line text
    input: String,
    /// Screen rows scrolled back from the bottom
    scroll_offset: usize,
    /// Maximum logical lines kept
    max_lines: usize,
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self::new(SCROLLBACK_LIMIT)
    }
}

impl ConsoleView {
    pub fn new(max_lines: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(StyledLine::default());
        Self {
            lines,
            input: String::new(),
            scroll_offset: 0,
            max_lines: max_lines.max(1),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &StyledLine> {
        self.lines.iter()
    }

    /// Plain text of every logical line
    pub fn text_lines(&self) -> Vec<String> {
        self.lines.iter().map(StyledLine::text).collect()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push_char(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(rows);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(rows);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    /// Screen rows for the scrollback area, oldest first.
    ///
    /// Clamps the scroll offset so the top of the scrollback stays reachable.
    pub fn visible_rows(&mut self, width: usize, height: usize) -> Vec<Vec<Segment>> {
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let mut rows: Vec<Vec<Segment>> = Vec::new();
        for line in &self.lines {
            rows.extend(wrap_line(line, width));
        }
        // The open line is only shown once something was written to it
        if self.lines.back().map_or(false, |l| l.segments.is_empty()) {
            rows.pop();
        }

        let max_offset = rows.len().saturating_sub(height);
        self.scroll_offset = self.scroll_offset.min(max_offset);

        let end = rows.len() - self.scroll_offset;
        let start = end.saturating_sub(height);
        rows.drain(start..end).collect()
    }

    fn trim(&mut self) {
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }
}

impl PresentationSink for ConsoleView {
    fn append_output(&mut self, text: &str, style: OutputStyle) {
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.lines.push_back(StyledLine::default());
            }
            let part = part.replace('\r', "");
            if part.is_empty() {
                continue;
            }
            if let Some(line) = self.lines.back_mut() {
                line.push(&part, style);
            }
        }
        self.trim();
    }

    fn input_text(&self) -> String {
        self.input.clone()
    }

    fn set_input_text(&mut self, text: &str) {
        self.input = text.to_string();
    }
}

/// Split a logical line into rows of at most `width` columns
pub fn wrap_line(line: &StyledLine, width: usize) -> Vec<Vec<Segment>> {
    let mut rows = vec![Vec::new()];
    let mut col = 0;

    for (text, style) in &line.segments {
        let mut run = String::new();
        for ch in text.chars() {
            let (shown, w) = match ch {
                '\t' => (None, TAB_WIDTH - col % TAB_WIDTH),
                c if c.is_control() => continue,
                c => (Some(c), c.width().unwrap_or(0)),
            };

            if col + w > width && col > 0 {
                flush_run(&mut rows, &mut run, *style);
                rows.push(Vec::new());
                col = 0;
            }

            match shown {
                Some(c) => run.push(c),
                None => run.extend(std::iter::repeat(' ').take(w.min(width))),
            }
            col += w;
        }
        flush_run(&mut rows, &mut run, *style);
    }

    rows
}

fn flush_run(rows: &mut [Vec<Segment>], run: &mut String, style: OutputStyle) {
    if run.is_empty() {
        return;
    }
    if let Some(row) = rows.last_mut() {
        row.push((std::mem::take(run), style));
    }
}

/// Status bar contents
pub struct StatusInfo<'a> {
    pub program: &'a str,
    pub running: bool,
    pub input_enabled: bool,
}

/// Console renderer
pub struct Renderer {
    /// Active color scheme
    scheme: ColorScheme,
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(ColorScheme::default())
    }
}

impl Renderer {
    pub fn new(scheme: ColorScheme) -> Self {
        Self {
            scheme,
            initialized: false,
        }
    }

    /// Get the terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show, EnableLineWrap, LeaveAlternateScreen);
        let _ = stdout.flush();

        terminal::disable_raw_mode()
    }

    /// Render the view: scrollback, input line, status bar
    pub fn render(&mut self, view: &mut ConsoleView, status: &StatusInfo) -> io::Result<()> {
        let (cols, rows) = Self::size()?;
        let width = cols as usize;
        let body_height = rows.saturating_sub(2) as usize;

        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());
        queue!(out, Hide)?;

        let body = view.visible_rows(width, body_height);
        for row in 0..body_height {
            queue!(out, MoveTo(0, row as u16), ResetColor, Clear(ClearType::CurrentLine))?;
            // Scrollback is bottom-aligned
            let skip = body_height - body.len();
            if row < skip {
                continue;
            }
            for (text, style) in &body[row - skip] {
                queue!(
                    out,
                    SetForegroundColor(self.scheme.style_fg(*style).to_crossterm()),
                    Print(text)
                )?;
            }
        }

        let cursor_col = self.render_input(&mut out, view, status, width, body_height as u16)?;
        self.render_status(&mut out, view, status, width, rows.saturating_sub(1))?;

        queue!(out, ResetColor)?;
        if status.input_enabled {
            queue!(out, MoveTo(cursor_col, body_height as u16), Show)?;
        }
        out.flush()
    }

    /// Draw the prompt and input line; returns the cursor column
    fn render_input<W: Write>(
        &self,
        out: &mut W,
        view: &ConsoleView,
        status: &StatusInfo,
        width: usize,
        row: u16,
    ) -> io::Result<u16> {
        queue!(out, MoveTo(0, row), ResetColor, Clear(ClearType::CurrentLine))?;
        queue!(
            out,
            SetForegroundColor(self.scheme.prompt_fg.to_crossterm()),
            Print(PROMPT)
        )?;

        let available = width.saturating_sub(PROMPT.len());
        let (shown, shown_width) = tail_fitting(view.input(), available);
        let fg = if status.input_enabled {
            self.scheme.input_fg
        } else {
            self.scheme.input_disabled_fg
        };
        queue!(out, SetForegroundColor(fg.to_crossterm()), Print(shown))?;

        Ok((PROMPT.len() + shown_width).min(width.saturating_sub(1)) as u16)
    }

    fn render_status<W: Write>(
        &self,
        out: &mut W,
        view: &ConsoleView,
        status: &StatusInfo,
        width: usize,
        row: u16,
    ) -> io::Result<()> {
        let bg = if status.running {
            self.scheme.status_bar_bg
        } else {
            self.scheme.status_exited_bg
        };
        let state = if status.running { "running" } else { "exited" };
        let mut text = format!(" {} [{}]", status.program, state);
        if view.scroll_offset() > 0 {
            text.push_str(&format!("  [↑ {} rows]", view.scroll_offset()));
        }
        if !status.running {
            text.push_str("  Ctrl+Q to quit");
        }

        let (shown, shown_width) = head_fitting(&text, width);
        queue!(
            out,
            MoveTo(0, row),
            SetBackgroundColor(bg.to_crossterm()),
            SetForegroundColor(self.scheme.status_bar_fg.to_crossterm()),
            Print(shown),
            Print(" ".repeat(width.saturating_sub(shown_width))),
            ResetColor
        )?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Longest prefix of `text` that fits in `width` columns
fn head_fitting(text: &str, width: usize) -> (&str, usize) {
    let mut used = 0;
    for (i, ch) in text.char_indices() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            return (&text[..i], used);
        }
        used += w;
    }
    (text, used)
}

/// Longest suffix of `text` that fits in `width` columns
fn tail_fitting(text: &str, width: usize) -> (&str, usize) {
    let mut used = 0;
    let mut start = text.len();
    for (i, ch) in text.char_indices().rev() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        start = i;
    }
    (&text[start..], used)
}
