use crate::canvas::PixelCanvas;
use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

/// Minimum brightness step (0..1) for a braille dot to be drawn as ink
/// rather than merged into the cell background.
const INK_THRESHOLD: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    #[cfg(test)]
    pub(crate) fn get(&self, x: u16, y: u16) -> Option<Cell> {
        (x < self.w && y < self.h).then(|| self.cells[self.idx(x, y)])
    }
}

/// Opaque RGB frame the layers are flattened into, black underneath.
pub(crate) struct Frame {
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) rgb: Vec<[f32; 3]>,
}

impl Frame {
    /// A frame covering `cols` x `rows` cells at `ratio` raster pixels per dot.
    pub(crate) fn new(cols: u16, rows: u16, ratio: f32) -> Self {
        let w = (cols as f32 * 2.0 * ratio).ceil().max(1.0) as u32;
        let h = (rows as f32 * 4.0 * ratio).ceil().max(1.0) as u32;
        Self {
            w,
            h,
            rgb: vec![[0.0; 3]; (w as usize) * (h as usize)],
        }
    }

    /// Source-over `canvas` at `opacity`. Only the overlapping top-left
    /// region is used; canvas rows beyond the viewport are off screen.
    pub(crate) fn composite(&mut self, canvas: &PixelCanvas, opacity: f32) {
        let w = self.w.min(canvas.w);
        let h = self.h.min(canvas.h);
        for y in 0..h {
            for x in 0..w {
                let p = canvas.px[canvas.idx(x, y)];
                let a = p.a as f32 / 255.0 * opacity;
                if a <= 0.0 {
                    continue;
                }
                let dst = &mut self.rgb[(y as usize) * (self.w as usize) + x as usize];
                let src = [p.r as f32 / 255.0, p.g as f32 / 255.0, p.b as f32 / 255.0];
                for k in 0..3 {
                    dst[k] = src[k] * a + dst[k] * (1.0 - a);
                }
            }
        }
    }
}

fn braille_bit(dx: usize, dy: usize) -> u8 {
    match (dx, dy) {
        (0, 0) => 0x01,
        (0, 1) => 0x02,
        (0, 2) => 0x04,
        (0, 3) => 0x40,
        (1, 0) => 0x08,
        (1, 1) => 0x10,
        (1, 2) => 0x20,
        (1, 3) => 0x80,
        _ => 0x00,
    }
}

fn luma(c: [f32; 3]) -> f32 {
    0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2]
}

fn to_color(c: [f32; 3]) -> Color {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    Color::Rgb {
        r: q(c[0]),
        g: q(c[1]),
        b: q(c[2]),
    }
}

fn average(colors: impl Iterator<Item = [f32; 3]>) -> [f32; 3] {
    let mut sum = [0.0; 3];
    let mut n = 0.0;
    for c in colors {
        for k in 0..3 {
            sum[k] += c[k];
        }
        n += 1.0;
    }
    if n == 0.0 {
        return sum;
    }
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

/// Raster span covered by dot index `d` at `ratio` pixels per dot.
fn dot_span(d: u32, ratio: f32, limit: u32) -> (u32, u32) {
    let a = ((d as f32) * ratio).floor() as u32;
    let b = (((d + 1) as f32) * ratio).floor() as u32;
    let a = a.min(limit.saturating_sub(1));
    (a, b.max(a + 1).min(limit))
}

/// Braille rasterisation: the darkest dot sets the cell background, dots
/// clearly brighter than it become ink coloured by their average.
pub(crate) fn frame_to_cells(frame: &Frame, ratio: f32, out: &mut CellBuffer) {
    for cy in 0..out.h {
        for cx in 0..out.w {
            let mut dots = [[0.0f32; 3]; 8];
            for dy in 0..4u32 {
                for dx in 0..2u32 {
                    let (x0, x1) = dot_span(cx as u32 * 2 + dx, ratio, frame.w);
                    let (y0, y1) = dot_span(cy as u32 * 4 + dy, ratio, frame.h);
                    let px = (y0..y1).flat_map(|y| {
                        (x0..x1).map(move |x| frame.rgb[(y as usize) * (frame.w as usize) + x as usize])
                    });
                    dots[(dy * 2 + dx) as usize] = average(px);
                }
            }

            let base = dots.iter().map(|&c| luma(c)).fold(f32::MAX, f32::min);
            let mut mask = 0u8;
            for (i, &c) in dots.iter().enumerate() {
                if luma(c) > base + INK_THRESHOLD {
                    mask |= braille_bit(i % 2, i / 2);
                }
            }

            let is_ink = |i: usize| luma(dots[i]) > base + INK_THRESHOLD;
            let bg = average((0..8).filter(|&i| !is_ink(i)).map(|i| dots[i]));
            let cell = if mask == 0 {
                Cell {
                    ch: ' ',
                    fg: Color::White,
                    bg: to_color(bg),
                }
            } else {
                let fg = average((0..8).filter(|&i| is_ink(i)).map(|i| dots[i]));
                Cell {
                    ch: char::from_u32(0x2800 + mask as u32).unwrap_or(' '),
                    fg: to_color(fg),
                    bg: to_color(bg),
                }
            };
            out.set(cx, cy, cell);
        }
    }
}

pub(crate) fn draw_text(buf: &mut CellBuffer, x: u16, y: u16, s: &str, fg: Color, bg: Color) {
    for (i, ch) in s.chars().enumerate() {
        let xx = x.saturating_add(i as u16);
        if xx >= buf.w || y >= buf.h {
            break;
        }
        buf.set(xx, y, Cell { ch, fg, bg });
    }
}

pub(crate) fn draw_center_box(buf: &mut CellBuffer, title: &str, lines: &[&str]) {
    let (w, h) = (buf.w, buf.h);
    let bw = 44u16.min(w.saturating_sub(2));
    let bh = (lines.len() as u16 + 4).min(h.saturating_sub(2));
    if bw < 4 || bh < 3 {
        return;
    }
    let x0 = (w - bw) / 2;
    let y0 = (h - bh) / 2;
    let (fg, bg) = (Color::Grey, Color::Black);

    for y in y0..y0 + bh {
        for x in x0..x0 + bw {
            let top = y == y0;
            let bottom = y == y0 + bh - 1;
            let left = x == x0;
            let right = x == x0 + bw - 1;
            let ch = match (top, bottom, left, right) {
                (true, _, true, _) => '┌',
                (true, _, _, true) => '┐',
                (_, true, true, _) => '└',
                (_, true, _, true) => '┘',
                (true, _, _, _) | (_, true, _, _) => '─',
                (_, _, true, _) | (_, _, _, true) => '│',
                _ => ' ',
            };
            buf.set(x, y, Cell { ch, fg, bg });
        }
    }

    draw_text(buf, x0 + 2, y0 + 1, title, Color::White, bg);
    for (i, line) in lines.iter().enumerate() {
        let yy = y0 + 3 + i as u16;
        if yy >= y0 + bh - 1 {
            break;
        }
        let clipped: String = line.chars().take(bw.saturating_sub(4) as usize).collect();
        draw_text(buf, x0 + 2, yy, &clipped, fg, bg);
    }
}

pub(crate) struct Terminal {
    out: io::Stdout,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    prev: CellBuffer,
    pub(crate) cur: CellBuffer,
    force_full: bool,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            force_full: true,
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize(&mut self, cols: u16, rows: u16) {
        if cols == self.cols && rows == self.rows {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        self.prev = CellBuffer::new(cols, rows);
        self.cur = CellBuffer::new(cols, rows);
        self.force_full = true;
    }

    /// Write changed cells (all cells after a resize).
    pub(crate) fn present(&mut self) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if !self.force_full && c == self.prev.cells[i] {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;
                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }
                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        self.force_full = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{rgba, Paint};
    use crate::surface::Surface;
    use crate::config::Settings;
    use crate::surface::Viewport;

    #[test]
    fn single_bright_dot_becomes_braille_ink() {
        let mut frame = Frame::new(2, 1, 1.0);
        // cell (1,0), dot (1,2)
        let i = 2 * frame.w as usize + 3;
        frame.rgb[i] = [1.0, 1.0, 1.0];
        let mut cells = CellBuffer::new(2, 1);
        frame_to_cells(&frame, 1.0, &mut cells);

        assert_eq!(cells.get(0, 0).unwrap().ch, ' ');
        let c = cells.get(1, 0).unwrap();
        assert_eq!(c.ch, char::from_u32(0x2800 + 0x20).unwrap());
        assert_eq!(c.fg, Color::Rgb { r: 255, g: 255, b: 255 });
        assert_eq!(c.bg, Color::Rgb { r: 0, g: 0, b: 0 });
    }

    #[test]
    fn flat_colour_fills_background_only() {
        let mut frame = Frame::new(3, 2, 1.0);
        frame.rgb.fill([0.2, 0.4, 0.6]);
        let mut cells = CellBuffer::new(3, 2);
        frame_to_cells(&frame, 1.0, &mut cells);
        for c in &cells.cells {
            assert_eq!(c.ch, ' ');
            assert_eq!(c.bg, Color::Rgb { r: 51, g: 102, b: 153 });
        }
    }

    #[test]
    fn supersampled_frame_averages_into_dots() {
        let frame = Frame::new(4, 2, 1.5);
        assert_eq!((frame.w, frame.h), (12, 12));
        let mut cells = CellBuffer::new(4, 2);
        frame_to_cells(&frame, 1.5, &mut cells);
        assert!(cells.cells.iter().all(|c| c.ch == ' '));
    }

    #[test]
    fn composite_respects_layer_opacity() {
        let surface = Surface::measure(Viewport { cols: 4, rows: 2 }, &Settings::default()).unwrap();
        let mut canvas = PixelCanvas::new(&surface);
        canvas.fill_rect(0.0, 0.0, surface.width, surface.height, &Paint::Solid(rgba(255, 255, 255, 1.0)));
        let mut frame = Frame::new(4, 2, surface.pixel_ratio);
        frame.composite(&canvas, 0.5);
        assert!(frame.rgb.iter().all(|c| (c[0] - 0.5).abs() < 1e-6));
    }

    #[test]
    fn box_fits_inside_tiny_buffers() {
        let mut buf = CellBuffer::new(3, 2);
        draw_center_box(&mut buf, "help", &["a", "b"]);
        let mut buf = CellBuffer::new(60, 20);
        draw_center_box(&mut buf, "help", &["line"]);
        assert!(buf.cells.iter().any(|c| c.ch == '┌'));
    }
}
