//! Styled character grid ("amp"): a W×H cell matrix holding a glyph and a
//! style per cell, serializable to ANSI SGR with palette-aware diffing.

pub const GLYPH_SIZE: usize = 5;
pub const STYLE_SIZE: usize = 7;
pub const CELL_SIZE: usize = GLYPH_SIZE + STYLE_SIZE;

const FLAG_FG: u8 = 1 << 0;
const FLAG_BG: u8 = 1 << 1;
const FLAG_HIDDEN: u8 = 1 << 2;
const FLAG_FAINT: u8 = 1 << 3;
const FLAG_ITALIC: u8 = 1 << 4;
const FLAG_UNDERLINE: u8 = 1 << 5;
const FLAG_BLINKING: u8 = 1 << 6;
const FLAG_STRIKETHROUGH: u8 = 1 << 7;

/// One cell's visual style. `fg`/`bg` are `None` when unset. `broken` and
/// `reset` are runtime-only markers never written into the 7-byte
/// serialized form: `broken` flags a synthetic out-of-range read, `reset`
/// requests an unconditional leading SGR 0 when this style is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Option<(u8, u8, u8)>,
    pub bg: Option<(u8, u8, u8)>,
    pub hidden: bool,
    pub faint: bool,
    pub italic: bool,
    pub underline: bool,
    pub blinking: bool,
    pub strikethrough: bool,
    pub broken: bool,
    pub reset: bool,
}

impl Style {
    pub fn broken() -> Self {
        Style {
            broken: true,
            ..Default::default()
        }
    }

    fn flags_byte(&self) -> u8 {
        let mut b = 0u8;
        if self.fg.is_some() {
            b |= FLAG_FG;
        }
        if self.bg.is_some() {
            b |= FLAG_BG;
        }
        if self.hidden {
            b |= FLAG_HIDDEN;
        }
        if self.faint {
            b |= FLAG_FAINT;
        }
        if self.italic {
            b |= FLAG_ITALIC;
        }
        if self.underline {
            b |= FLAG_UNDERLINE;
        }
        if self.blinking {
            b |= FLAG_BLINKING;
        }
        if self.strikethrough {
            b |= FLAG_STRIKETHROUGH;
        }
        b
    }

    fn serialize(&self) -> [u8; STYLE_SIZE] {
        let (fr, fg, fb) = self.fg.unwrap_or((0, 0, 0));
        let (br, bg, bb) = self.bg.unwrap_or((0, 0, 0));
        [fr, fg, fb, br, bg, bb, self.flags_byte()]
    }

    fn deserialize(raw: &[u8; STYLE_SIZE]) -> Self {
        let flags = raw[6];
        Style {
            fg: (flags & FLAG_FG != 0).then_some((raw[0], raw[1], raw[2])),
            bg: (flags & FLAG_BG != 0).then_some((raw[3], raw[4], raw[5])),
            hidden: flags & FLAG_HIDDEN != 0,
            faint: flags & FLAG_FAINT != 0,
            italic: flags & FLAG_ITALIC != 0,
            underline: flags & FLAG_UNDERLINE != 0,
            blinking: flags & FLAG_BLINKING != 0,
            strikethrough: flags & FLAG_STRIKETHROUGH != 0,
            broken: false,
            reset: false,
        }
    }

    fn attr_codes(&self) -> Vec<u32> {
        let mut v = Vec::new();
        if self.faint {
            v.push(2);
        }
        if self.italic {
            v.push(3);
        }
        if self.underline {
            v.push(4);
        }
        if self.blinking {
            v.push(5);
        }
        if self.hidden {
            v.push(8);
        }
        if self.strikethrough {
            v.push(9);
        }
        v
    }

    /// Attributes that are on in `self` and off in `other` — i.e. would
    /// require an SGR reset to clear when transitioning `self -> other`.
    fn has_attr_turned_off(&self, other: &Style) -> bool {
        (self.hidden && !other.hidden)
            || (self.faint && !other.faint)
            || (self.italic && !other.italic)
            || (self.underline && !other.underline)
            || (self.blinking && !other.blinking)
            || (self.strikethrough && !other.strikethrough)
            || (self.fg.is_some() && other.fg.is_none())
            || (self.bg.is_some() && other.bg.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Classic16,
    TrueColor,
}

// The 16-entry classic palette: indices 0..7 normal, 8..15 bright.
const PALETTE16: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (128, 0, 0),
    (0, 128, 0),
    (128, 128, 0),
    (0, 0, 128),
    (128, 0, 128),
    (0, 128, 128),
    (192, 192, 192),
    (128, 128, 128),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (0, 0, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

fn nearest_palette_index(rgb: (u8, u8, u8)) -> usize {
    let mut best = 0usize;
    let mut best_dist = u32::MAX;
    for (i, &(r, g, b)) in PALETTE16.iter().enumerate() {
        let dr = r as i32 - rgb.0 as i32;
        let dg = g as i32 - rgb.1 as i32;
        let db = b as i32 - rgb.2 as i32;
        let dist = (dr * dr + dg * dg + db * db) as u32;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Validate the leading UTF-8 sequence of `bytes` (at most 4 bytes looked
/// at), returning its byte length, or `None` if invalid. Rejects overlong
/// encodings, UTF-16 surrogate code points, and anything past U+10FFFF,
/// mirroring RFC 3629.
fn utf8_lead_len(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }
    let b0 = bytes[0];
    if b0 < 0x80 {
        return Some(1);
    }
    let is_cont = |b: u8| (0x80..=0xBF).contains(&b);
    if (0xC2..=0xDF).contains(&b0) {
        if bytes.len() < 2 || !is_cont(bytes[1]) {
            return None;
        }
        return Some(2);
    }
    if (0xE0..=0xEF).contains(&b0) {
        if bytes.len() < 3 || !is_cont(bytes[1]) || !is_cont(bytes[2]) {
            return None;
        }
        if b0 == 0xE0 && bytes[1] < 0xA0 {
            return None; // overlong
        }
        if b0 == 0xED && bytes[1] >= 0xA0 {
            return None; // surrogate
        }
        return Some(3);
    }
    if (0xF0..=0xF4).contains(&b0) {
        if bytes.len() < 4 || !is_cont(bytes[1]) || !is_cont(bytes[2]) || !is_cont(bytes[3]) {
            return None;
        }
        if b0 == 0xF0 && bytes[1] < 0x90 {
            return None; // overlong
        }
        if b0 == 0xF4 && bytes[1] >= 0x90 {
            return None; // past U+10FFFF
        }
        return Some(4);
    }
    None
}

pub struct Grid {
    width: usize,
    height: usize,
    glyphs: Vec<u8>,
    styles: Vec<u8>,
}

impl Grid {
    /// Required backing size in bytes for a W×H grid.
    pub fn bytes_required(width: usize, height: usize) -> usize {
        width * height * CELL_SIZE
    }

    pub fn new(width: usize, height: usize) -> Self {
        let cells = width * height;
        Grid {
            width,
            height,
            glyphs: vec![0u8; cells * GLYPH_SIZE],
            styles: vec![0u8; cells * STYLE_SIZE],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn cell_index(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.glyphs.iter_mut().for_each(|b| *b = 0);
        self.styles.iter_mut().for_each(|b| *b = 0);
    }

    /// Write the glyph at (x,y) from a NUL-terminated (or short) byte
    /// slice. Reads at most 5 bytes, validates the leading UTF-8 sequence,
    /// truncates if the supplied bytes are longer than the code point, and
    /// rejects (returning `false`, cell unchanged) if invalid.
    pub fn set_glyph(&mut self, x: usize, y: usize, bytes: &[u8]) -> bool {
        let Some(idx) = self.cell_index(x, y) else {
            return false;
        };
        let capped = &bytes[..bytes.len().min(GLYPH_SIZE)];
        let nul_pos = capped.iter().position(|&b| b == 0).unwrap_or(capped.len());
        let trimmed = &capped[..nul_pos];
        if trimmed.is_empty() {
            let base = idx * GLYPH_SIZE;
            self.glyphs[base..base + GLYPH_SIZE].fill(0);
            return true;
        }
        let Some(len) = utf8_lead_len(trimmed) else {
            return false;
        };
        let base = idx * GLYPH_SIZE;
        self.glyphs[base..base + GLYPH_SIZE].fill(0);
        self.glyphs[base..base + len].copy_from_slice(&trimmed[..len]);
        true
    }

    /// Returns the stored glyph bytes (NUL-terminated, up to 5 bytes). An
    /// out-of-range cell reads back as blank.
    pub fn get_glyph(&self, x: usize, y: usize) -> [u8; GLYPH_SIZE] {
        let mut out = [0u8; GLYPH_SIZE];
        if let Some(idx) = self.cell_index(x, y) {
            let base = idx * GLYPH_SIZE;
            out.copy_from_slice(&self.glyphs[base..base + GLYPH_SIZE]);
        }
        out
    }

    pub fn set_style(&mut self, x: usize, y: usize, style: &Style) -> bool {
        let Some(idx) = self.cell_index(x, y) else {
            return false;
        };
        let base = idx * STYLE_SIZE;
        self.styles[base..base + STYLE_SIZE].copy_from_slice(&style.serialize());
        true
    }

    /// Out-of-range reads return a synthetic broken style (all fields
    /// zero, `broken` set).
    pub fn get_style(&self, x: usize, y: usize) -> Style {
        match self.cell_index(x, y) {
            Some(idx) => {
                let base = idx * STYLE_SIZE;
                let mut raw = [0u8; STYLE_SIZE];
                raw.copy_from_slice(&self.styles[base..base + STYLE_SIZE]);
                Style::deserialize(&raw)
            }
            None => Style::broken(),
        }
    }

    pub fn set_fg(&mut self, x: usize, y: usize, rgb: (u8, u8, u8)) -> bool {
        let mut s = self.get_style(x, y);
        s.fg = Some(rgb);
        self.set_style(x, y, &s)
    }

    pub fn reset_fg(&mut self, x: usize, y: usize) -> bool {
        let mut s = self.get_style(x, y);
        s.fg = None;
        self.set_style(x, y, &s)
    }

    pub fn set_bg(&mut self, x: usize, y: usize, rgb: (u8, u8, u8)) -> bool {
        let mut s = self.get_style(x, y);
        s.bg = Some(rgb);
        self.set_style(x, y, &s)
    }

    pub fn reset_bg(&mut self, x: usize, y: usize) -> bool {
        let mut s = self.get_style(x, y);
        s.bg = None;
        self.set_style(x, y, &s)
    }

    /// Computes the SGR transition from `prev` to `next`. Emits a full
    /// reset plus re-application when any attribute needs turning off;
    /// otherwise emits only the deltas. Never emits an empty CSI.
    fn style_update_to_ansi(prev: &Style, next: &Style, palette: Palette) -> String {
        let full_reapply = next.reset || prev.has_attr_turned_off(next);
        let base = if full_reapply { Style::default() } else { *prev };

        let mut codes: Vec<String> = Vec::new();
        for code in next.attr_codes() {
            let was_on = match code {
                2 => base.faint,
                3 => base.italic,
                4 => base.underline,
                5 => base.blinking,
                8 => base.hidden,
                9 => base.strikethrough,
                _ => false,
            };
            if !was_on {
                codes.push(code.to_string());
            }
        }

        let mut reverse = false;
        let mut fg_for_emit = next.fg;
        let mut bg_for_emit = next.bg;

        match palette {
            Palette::TrueColor => {
                if next.fg != base.fg {
                    if let Some((r, g, b)) = next.fg {
                        codes.push(format!("38;2;{r};{g};{b}"));
                    }
                }
                if next.bg != base.bg {
                    if let Some((r, g, b)) = next.bg {
                        codes.push(format!("48;2;{r};{g};{b}"));
                    }
                }
            }
            Palette::Classic16 => {
                if let Some(bg_rgb) = next.bg {
                    let idx = nearest_palette_index(bg_rgb);
                    if idx >= 8 {
                        // emulate bright background via reverse video + swapped fg
                        reverse = true;
                        fg_for_emit = Some(bg_rgb);
                        bg_for_emit = next.fg;
                    }
                }
                if fg_for_emit != base.fg || reverse {
                    if let Some(rgb) = fg_for_emit {
                        let idx = nearest_palette_index(rgb);
                        codes.push((30 + (idx % 8) as u32).to_string());
                    }
                }
                if bg_for_emit != base.bg || reverse {
                    if let Some(rgb) = bg_for_emit {
                        let idx = nearest_palette_index(rgb);
                        codes.push((40 + (idx % 8) as u32).to_string());
                    }
                }
                if reverse {
                    codes.push("7".to_string());
                }
            }
        }

        if full_reapply {
            if codes.is_empty() {
                "\x1b[0m".to_string()
            } else {
                format!("\x1b[0;{}m", codes.join(";"))
            }
        } else if codes.is_empty() {
            String::new()
        } else {
            format!("\x1b[{}m", codes.join(";"))
        }
    }

    /// Serialize a horizontal cut `[x, x+w)` of row `y` to ANSI, appending
    /// to `out`. The row always ends with a full SGR reset.
    pub fn row_cut_to_ansi(&self, x: usize, y: usize, w: usize, palette: Palette, out: &mut String) {
        let mut prev = Style::default();
        for col in x..x + w {
            let next = self.get_style(col, y);
            let next = if next.broken { Style::default() } else { next };
            out.push_str(&Self::style_update_to_ansi(&prev, &next, palette));
            let glyph = self.get_glyph(col, y);
            let nul = glyph.iter().position(|&b| b == 0).unwrap_or(GLYPH_SIZE);
            if nul == 0 {
                out.push(' ');
            } else {
                out.push_str(std::str::from_utf8(&glyph[..nul]).unwrap_or(" "));
            }
            prev = next;
        }
        out.push_str("\x1b[0m");
    }

    pub fn row_to_ansi(&self, y: usize, palette: Palette, out: &mut String) {
        self.row_cut_to_ansi(0, y, self.width, palette, out);
    }

    pub fn to_ansi(&self, palette: Palette) -> String {
        let mut out = String::new();
        for y in 0..self.height {
            if y > 0 {
                out.push_str("\r\n");
            }
            self.row_to_ansi(y, palette, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_round_trips_through_set_get() {
        let mut g = Grid::new(4, 2);
        let s = Style {
            fg: Some((10, 20, 30)),
            bg: Some((40, 50, 60)),
            italic: true,
            underline: true,
            ..Default::default()
        };
        g.set_style(1, 0, &s);
        let back = g.get_style(1, 0);
        assert_eq!(back.fg, s.fg);
        assert_eq!(back.bg, s.bg);
        assert!(back.italic);
        assert!(back.underline);
        assert!(!back.broken);
    }

    #[test]
    fn glyph_round_trips_with_nul_padding() {
        let mut g = Grid::new(2, 1);
        assert!(g.set_glyph(0, 0, b"A\0"));
        assert_eq!(g.get_glyph(0, 0), [b'A', 0, 0, 0, 0]);
    }

    #[test]
    fn glyph_multibyte_round_trips() {
        let mut g = Grid::new(2, 1);
        let euro = "€".as_bytes(); // 3 bytes
        assert!(g.set_glyph(0, 0, euro));
        let back = g.get_glyph(0, 0);
        assert_eq!(&back[..3], euro);
        assert_eq!(back[3], 0);
    }

    #[test]
    fn s5_invalid_overlong_utf8_rejected() {
        let mut g = Grid::new(1, 1);
        assert!(!g.set_glyph(0, 0, &[0xC0, 0xAF]));
        assert_eq!(g.get_glyph(0, 0), [0u8; GLYPH_SIZE]);
    }

    #[test]
    fn surrogate_code_point_rejected() {
        assert_eq!(utf8_lead_len(&[0xED, 0xA0, 0x80]), None);
    }

    #[test]
    fn s6_out_of_range_style_is_broken() {
        let g = Grid::new(3, 3);
        let s = g.get_style(3, 0);
        assert!(s.broken);
        assert_eq!(s.fg, None);
        assert_eq!(s.bg, None);
    }

    #[test]
    fn out_of_range_set_fails() {
        let mut g = Grid::new(3, 3);
        assert!(!g.set_style(3, 0, &Style::default()));
        assert!(!g.set_glyph(0, 3, b"x"));
    }

    #[test]
    fn bytes_required_matches_cell_layout() {
        assert_eq!(Grid::bytes_required(10, 5), 10 * 5 * CELL_SIZE);
    }

    #[test]
    fn row_ends_with_reset() {
        let mut g = Grid::new(3, 1);
        g.set_fg(1, 0, (255, 0, 0));
        let mut out = String::new();
        g.row_to_ansi(0, Palette::TrueColor, &mut out);
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn s4_truecolor_row_styling() {
        let mut g = Grid::new(4, 1);
        assert!(g.set_glyph(2, 0, b"A"));
        let mut s = g.get_style(2, 0);
        s.fg = Some((255, 0, 0));
        g.set_style(2, 0, &s);
        let mut out = String::new();
        g.row_to_ansi(0, Palette::TrueColor, &mut out);
        assert!(out.contains("38;2;255;0;0"));
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn blank_cell_serializes_as_space() {
        let g = Grid::new(1, 1);
        let mut out = String::new();
        g.row_to_ansi(0, Palette::TrueColor, &mut out);
        assert_eq!(out, " \x1b[0m");
    }

    #[test]
    fn classic16_bright_background_uses_reverse_video() {
        let mut g = Grid::new(1, 1);
        g.set_bg(0, 0, (255, 0, 0)); // bright red background
        let mut out = String::new();
        g.row_to_ansi(0, Palette::Classic16, &mut out);
        assert!(out.contains(";7"));
    }

    #[test]
    fn never_emits_empty_csi() {
        let g = Grid::new(1, 1);
        let mut out = String::new();
        g.row_to_ansi(0, Palette::TrueColor, &mut out);
        assert!(!out.contains("\x1b[m"));
    }
}
