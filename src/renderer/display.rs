use anyhow::Result;
use crossterm::{
    cursor,
    style::Print,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use std::io::{BufWriter, Stdout, Write};
use std::time::Instant;

use super::cell::{FrameBody, RenderedFrame, RgbColor, Token};
use crate::core::session::StatusLine;
use crate::utils::logger;

/// Where rendered frames, the status bar and fatal messages end up.
pub trait OutputSink {
    /// Replaces the previous frame entirely.
    fn present(&mut self, frame: &RenderedFrame) -> Result<()>;
    fn show_status(&mut self, status: &StatusLine) -> Result<()>;
    fn show_fatal(&mut self, message: &str) -> Result<()>;
}

// Helper for zero-allocation integer writing
#[inline(always)]
fn write_u8_fast(buffer: &mut Vec<u8>, mut n: u8) {
    if n >= 100 {
        buffer.push(b'0' + (n / 100));
        n %= 100;
        buffer.push(b'0' + (n / 10));
        n %= 10;
        buffer.push(b'0' + n);
    } else if n >= 10 {
        buffer.push(b'0' + (n / 10));
        n %= 10;
        buffer.push(b'0' + n);
    } else {
        buffer.push(b'0' + n);
    }
}

#[inline(always)]
fn write_u16_fast(buffer: &mut Vec<u8>, n: u16) {
    let mut digits = [0u8; 5];
    let mut len = 0;
    let mut n = n;
    loop {
        digits[len] = b'0' + (n % 10) as u8;
        len += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buffer.extend(digits[..len].iter().rev());
}

fn move_to(buffer: &mut Vec<u8>, col: u16, row: u16) {
    buffer.extend_from_slice(b"\x1b[");
    write_u16_fast(buffer, row + 1);
    buffer.push(b';');
    write_u16_fast(buffer, col + 1);
    buffer.push(b'H');
}

/// TrueColor foreground: `ESC[38;2;R;G;Bm`
fn write_fg(buffer: &mut Vec<u8>, color: RgbColor) {
    buffer.extend_from_slice(b"\x1b[38;2;");
    write_u8_fast(buffer, color.0);
    buffer.push(b';');
    write_u8_fast(buffer, color.1);
    buffer.push(b';');
    write_u8_fast(buffer, color.2);
    buffer.push(b'm');
}

fn push_char(buffer: &mut Vec<u8>, c: char) {
    let mut b_dst = [0u8; 4];
    buffer.extend_from_slice(c.encode_utf8(&mut b_dst).as_bytes());
}

/// Placement of a frame inside the terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub offset_x: u16,
    pub offset_y: u16,
    pub cols: u16,
    pub rows: u16,
}

impl Viewport {
    /// Centres `width`x`height` content in a `cols`x`rows` terminal whose last
    /// row is kept for the status bar.
    pub fn centered(width: usize, height: usize, cols: u16, rows: u16) -> Self {
        let usable_rows = rows.saturating_sub(1);
        let content_w = width.min(u16::MAX as usize) as u16;
        let content_h = height.min(u16::MAX as usize) as u16;
        Self {
            offset_x: cols.saturating_sub(content_w) / 2,
            offset_y: usable_rows.saturating_sub(content_h) / 2,
            cols,
            rows: usable_rows,
        }
    }
}

/// Encodes `frame` into `buffer`.
///
/// With a viewport every row is positioned explicitly and clipped to the
/// terminal; without one rows are separated by newlines. Colour escapes are
/// only emitted when the colour changes and reset at the end of each row.
pub fn encode_frame(frame: &RenderedFrame, viewport: Option<Viewport>, buffer: &mut Vec<u8>) {
    let mut row: usize = 0;
    let mut col: usize = 0;
    let mut last_fg: Option<RgbColor> = None;

    let visible = |row: usize, col: usize| match viewport {
        Some(v) => row < v.rows as usize && (v.offset_x as usize + col) < v.cols as usize,
        None => true,
    };
    let start_row = |buffer: &mut Vec<u8>, row: usize| {
        if let Some(v) = viewport {
            if row < v.rows as usize {
                move_to(buffer, v.offset_x, v.offset_y + row as u16);
            }
        }
    };

    match &frame.body {
        FrameBody::Plain(text) => {
            start_row(buffer, 0);
            for c in text.chars() {
                if c == '\n' {
                    row += 1;
                    col = 0;
                    if viewport.is_some() {
                        start_row(buffer, row);
                    } else {
                        buffer.push(b'\n');
                    }
                    continue;
                }
                if visible(row, col) {
                    push_char(buffer, c);
                }
                col += 1;
            }
        }
        FrameBody::Colored(tokens) => {
            start_row(buffer, 0);
            for token in tokens {
                match token {
                    Token::Glyph(cell) => {
                        if visible(row, col) {
                            if last_fg != Some(cell.color) {
                                write_fg(buffer, cell.color);
                                last_fg = Some(cell.color);
                            }
                            push_char(buffer, cell.glyph);
                        }
                        col += 1;
                    }
                    Token::RowBreak => {
                        buffer.extend_from_slice(b"\x1b[0m");
                        last_fg = None;
                        row += 1;
                        col = 0;
                        if viewport.is_some() {
                            start_row(buffer, row);
                        } else {
                            buffer.push(b'\n');
                        }
                    }
                }
            }
        }
    }
}

/// One DEC 2026 synchronized update under construction.
///
/// A frame and the status bar that follows it land in the same update, so the
/// terminal never shows a new frame next to a stale status.
#[derive(Default)]
struct SyncedUpdate {
    bytes: Vec<u8>,
    open: bool,
}

impl SyncedUpdate {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            open: false,
        }
    }

    fn begin(&mut self) {
        if !self.open {
            self.bytes.clear();
            // Synchronized update begin (DECSM 2026)
            self.bytes.extend_from_slice(b"\x1b[?2026h");
            self.open = true;
        }
    }

    fn frame(&mut self, frame: &RenderedFrame, viewport: Viewport, clear: bool) {
        self.begin();
        if clear {
            self.bytes.extend_from_slice(b"\x1b[2J");
        }
        encode_frame(frame, Some(viewport), &mut self.bytes);
        self.bytes.extend_from_slice(b"\x1b[0m");
    }

    /// Reverse video bar on the last row, clipped to the terminal width.
    fn status(&mut self, text: &str, cols: u16, rows: u16) {
        self.begin();
        move_to(&mut self.bytes, 0, rows.saturating_sub(1));
        self.bytes.extend_from_slice(b"\x1b[2K\x1b[7m");
        for c in text.chars().take(cols as usize) {
            push_char(&mut self.bytes, c);
        }
        self.bytes.extend_from_slice(b"\x1b[0m");
    }

    fn fatal(&mut self, message: &str, cols: u16, rows: u16) {
        self.discard();
        self.begin();
        let width = message.chars().count().min(cols as usize);
        self.bytes.extend_from_slice(b"\x1b[2J");
        move_to(&mut self.bytes, cols.saturating_sub(width as u16) / 2, rows / 2);
        self.bytes.extend_from_slice(b"\x1b[1;31m");
        for c in message.chars().take(width) {
            push_char(&mut self.bytes, c);
        }
        self.bytes.extend_from_slice(b"\x1b[0m");
    }

    /// Closes the update. Empty when nothing was begun.
    fn finish(&mut self) -> &[u8] {
        if self.open {
            self.bytes.extend_from_slice(b"\x1b[?2026l");
            self.open = false;
        } else {
            self.bytes.clear();
        }
        &self.bytes
    }

    fn discard(&mut self) {
        self.bytes.clear();
        self.open = false;
    }
}

/// Full-screen terminal output. Every frame replaces the previous one inside a
/// synchronized update so the terminal never shows a half-drawn frame.
///
/// `present` leaves the update open; the `show_status` that follows closes
/// and writes it.
pub struct DisplayManager {
    stdout: BufWriter<Stdout>,
    update: SyncedUpdate,
    last_size: Option<(usize, usize)>,
}

impl DisplayManager {
    pub fn new() -> Result<Self> {
        // Large output buffer to keep a whole frame in one write
        let stdout = BufWriter::with_capacity(4 * 1024 * 1024, std::io::stdout());
        let mut dm = Self {
            stdout,
            update: SyncedUpdate::with_capacity(4 * 1024 * 1024),
            last_size: None,
        };

        dm.initialize_terminal()?;

        Ok(dm)
    }

    fn initialize_terminal(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        self.stdout.execute(EnterAlternateScreen)?;
        self.stdout.execute(cursor::Hide)?;

        // Disable line wrapping (DECRAWM) so wide frames clip instead of scrolling
        self.stdout.execute(Print("\x1b[?7l"))?;
        self.stdout.execute(Print("\x1b[2J"))?;

        Ok(())
    }

    /// Return terminal size in character columns and rows, converting from pixels when needed.
    pub fn terminal_size_chars() -> Result<(u16, u16)> {
        let (mut term_cols, mut term_rows) = terminal::size()?;
        if let (Ok(cw_str), Ok(ch_str)) =
            (std::env::var("CHAR_WIDTH"), std::env::var("CHAR_HEIGHT"))
        {
            if let (Ok(cw), Ok(ch)) = (cw_str.parse::<u16>(), ch_str.parse::<u16>()) {
                // some hosts report pixels rather than cells
                if term_cols > cw.saturating_mul(16) {
                    term_cols = (term_cols / cw.max(1)).max(1);
                }
                if term_rows > ch.saturating_mul(8) {
                    term_rows = (term_rows / ch.max(1)).max(1);
                }
            }
        }
        Ok((term_cols, term_rows))
    }

    fn flush_update(&mut self) -> Result<()> {
        let start_io = Instant::now();
        let bytes = self.update.finish();
        if bytes.is_empty() {
            return Ok(());
        }
        let len = bytes.len();
        self.stdout.write_all(bytes)?;
        self.stdout.flush()?;

        let io_time = start_io.elapsed();
        if io_time.as_millis() > 10 {
            logger::debug(&format!("SLOW FLUSH: IO={}us | Bytes: {}", io_time.as_micros(), len));
        }
        Ok(())
    }
}

impl OutputSink for DisplayManager {
    fn present(&mut self, frame: &RenderedFrame) -> Result<()> {
        // a frame that never got its status line still goes out first
        if self.update.open {
            self.flush_update()?;
        }

        let start_render = Instant::now();
        let (cols, rows) = Self::terminal_size_chars().unwrap_or((80, 24));
        let viewport = Viewport::centered(frame.width, frame.height, cols, rows);

        // a smaller frame would leave stale glyphs around its border
        let size = (frame.width, frame.height);
        let clear = self.last_size != Some(size);
        self.last_size = Some(size);

        self.update.frame(frame, viewport, clear);

        let encode_time = start_render.elapsed();
        if encode_time.as_millis() > 10 {
            logger::debug(&format!(
                "SLOW PRESENT: Encode={}us | Cells: {}",
                encode_time.as_micros(),
                frame.width * frame.height
            ));
        }
        Ok(())
    }

    fn show_status(&mut self, status: &StatusLine) -> Result<()> {
        let (cols, rows) = Self::terminal_size_chars().unwrap_or((80, 24));
        self.update.status(&status.to_string(), cols, rows);
        self.flush_update()
    }

    fn show_fatal(&mut self, message: &str) -> Result<()> {
        let (cols, rows) = Self::terminal_size_chars().unwrap_or((80, 24));
        self.update.fatal(message, cols, rows);
        self.last_size = None;
        self.flush_update()
    }
}

impl Drop for DisplayManager {
    fn drop(&mut self) {
        let _ = self.flush_update();
        let _ = self.stdout.execute(Print("\x1b[?7h"));
        let _ = self.stdout.execute(cursor::Show);
        let _ = self.stdout.execute(LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Writes frames to any `Write` one after another, newline separated.
/// Used for snapshots and pipes; the status bar is not written.
pub struct StreamSink<W: Write> {
    out: W,
    buffer: Vec<u8>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buffer: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> OutputSink for StreamSink<W> {
    fn present(&mut self, frame: &RenderedFrame) -> Result<()> {
        self.buffer.clear();
        encode_frame(frame, None, &mut self.buffer);
        self.out.write_all(&self.buffer)?;
        self.out.flush()?;
        Ok(())
    }

    fn show_status(&mut self, _status: &StatusLine) -> Result<()> {
        Ok(())
    }

    fn show_fatal(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "{}", message)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::cell::CellData;

    fn plain(rows: &[&str]) -> RenderedFrame {
        let mut text = String::new();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        RenderedFrame {
            width: rows.first().map(|r| r.chars().count()).unwrap_or(0),
            height: rows.len(),
            body: FrameBody::Plain(text),
        }
    }

    #[test]
    fn test_u8_encoding() {
        for n in [0u8, 7, 10, 99, 100, 255] {
            let mut buf = Vec::new();
            write_u8_fast(&mut buf, n);
            assert_eq!(String::from_utf8(buf).unwrap(), n.to_string());
        }
        let mut buf = Vec::new();
        write_u16_fast(&mut buf, 65535);
        assert_eq!(buf, b"65535");
    }

    #[test]
    fn test_plain_stream_output() {
        let mut sink = StreamSink::new(Vec::new());
        sink.present(&plain(&["@@", ". "])).unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "@@\n. \n");
    }

    #[test]
    fn test_colored_stream_output_skips_repeated_colors() {
        let red = CellData { glyph: '#', color: RgbColor(255, 0, 0) };
        let blue = CellData { glyph: '.', color: RgbColor(0, 0, 9) };
        let frame = RenderedFrame {
            width: 3,
            height: 1,
            body: FrameBody::Colored(vec![
                Token::Glyph(red),
                Token::Glyph(red),
                Token::Glyph(blue),
                Token::RowBreak,
            ]),
        };
        let mut sink = StreamSink::new(Vec::new());
        sink.present(&frame).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "\x1b[38;2;255;0;0m##\x1b[38;2;0;0;9m.\x1b[0m\n");
    }

    #[test]
    fn test_viewport_centres_and_reserves_status_row() {
        let v = Viewport::centered(80, 60, 120, 41);
        assert_eq!(v.offset_x, 20);
        assert_eq!(v.offset_y, 0);
        assert_eq!(v.rows, 40);

        let v = Viewport::centered(10, 4, 20, 11);
        assert_eq!((v.offset_x, v.offset_y), (5, 3));
    }

    #[test]
    fn test_viewport_clips_to_terminal() {
        let viewport = Viewport { offset_x: 0, offset_y: 0, cols: 2, rows: 1 };
        let mut buf = Vec::new();
        encode_frame(&plain(&["abc", "def"]), Some(viewport), &mut buf);
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(out, "\x1b[1;1Hab");
    }

    #[test]
    fn test_positioned_rows() {
        let viewport = Viewport { offset_x: 3, offset_y: 1, cols: 10, rows: 5 };
        let mut buf = Vec::new();
        encode_frame(&plain(&["ab", "cd"]), Some(viewport), &mut buf);
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(out, "\x1b[2;4Hab\x1b[3;4Hcd\x1b[4;4H");
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_frame_and_status_share_one_update() {
        let mut update = SyncedUpdate::default();
        let viewport = Viewport::centered(2, 1, 10, 5);
        update.frame(&plain(&["@@"]), viewport, true);
        update.status("RUNNING", 10, 5);
        let out = String::from_utf8(update.finish().to_vec()).unwrap();

        assert!(out.starts_with("\x1b[?2026h\x1b[2J"));
        assert!(out.ends_with("\x1b[?2026l"));
        assert_eq!(count(&out, "\x1b[?2026h"), 1);
        assert_eq!(count(&out, "\x1b[?2026l"), 1);
        let frame_at = out.find("@@").unwrap();
        let status_at = out.find("RUNNING").unwrap();
        assert!(frame_at < status_at);
        // status bar sits on the last terminal row
        assert!(out.contains("\x1b[5;1H\x1b[2K\x1b[7mRUNNING"));
    }

    #[test]
    fn test_status_alone_is_synchronized() {
        let mut update = SyncedUpdate::default();
        update.status("PAUSED | 160x120", 6, 24);
        let out = String::from_utf8(update.finish().to_vec()).unwrap();
        assert!(out.starts_with("\x1b[?2026h"));
        assert!(out.ends_with("\x1b[?2026l"));
        assert!(out.contains("PAUSED\x1b[0m"));
    }

    #[test]
    fn test_finish_without_update_is_empty() {
        let mut update = SyncedUpdate::default();
        assert!(update.finish().is_empty());
        update.status("x", 10, 2);
        assert!(!update.finish().is_empty());
        assert!(update.finish().is_empty());
    }

    #[test]
    fn test_fatal_replaces_pending_frame() {
        let mut update = SyncedUpdate::default();
        update.frame(&plain(&["##"]), Viewport::centered(2, 1, 10, 5), false);
        update.fatal("boom", 10, 5);
        let out = String::from_utf8(update.finish().to_vec()).unwrap();
        assert!(!out.contains("##"));
        assert!(out.contains("\x1b[3;4H\x1b[1;31mboom"));
        assert_eq!(count(&out, "\x1b[?2026h"), 1);
    }

    #[test]
    fn test_fatal_message_written() {
        let mut sink = StreamSink::new(Vec::new());
        sink.show_fatal("boom").unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "boom\n");
    }
}
