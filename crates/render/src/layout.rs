// Page layout: A4, word wrapping, page breaks

use crate::rich_text::{Block, Span};

/// A4 in points
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
/// 2 cm
pub const MARGIN: f32 = 56.69;

const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const LIST_MARKER_INDENT: f32 = 10.0;
const LIST_TEXT_INDENT: f32 = 24.0;
const ITEM_GAP: f32 = 2.0;
const SPACER_HEIGHT: f32 = 6.0;

/// Standard Type1 faces used by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl Font {
    pub const ALL: [Font; 5] = [Font::Regular, Font::Bold, Font::Italic, Font::BoldItalic, Font::Mono];

    pub fn styled(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => Font::Regular,
            (true, false) => Font::Bold,
            (false, true) => Font::Italic,
            (true, true) => Font::BoldItalic,
        }
    }

    pub fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
            Font::BoldItalic => "F4",
            Font::Mono => "F5",
        }
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
            Font::BoldItalic => "Helvetica-BoldOblique",
            Font::Mono => "Courier",
        }
    }

    /// Glyph advance in thousandths of an em
    fn advance(&self, c: char) -> u16 {
        let bold = matches!(self, Font::Bold | Font::BoldItalic);
        match c {
            _ if matches!(self, Font::Mono) => 600,
            ' '..='~' => {
                let table = if bold { &HELVETICA_BOLD } else { &HELVETICA };
                table[c as usize - 32]
            }
            '\u{2022}' => 350,
            '\u{2013}' => 556,
            '\u{2014}' => 1000,
            '\u{2018}' | '\u{2019}' => if bold { 278 } else { 222 },
            '\u{201C}' | '\u{201D}' => if bold { 500 } else { 333 },
            _ => 556,
        }
    }
}

// Helvetica AFM widths for ' '..='~'
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(font.advance(c))).sum();
    units as f32 * size / 1000.0
}

/// Positioned text run, baseline origin in page coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub x: f32,
    pub y: f32,
    pub font: Font,
    pub size: f32,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub runs: Vec<Run>,
}

/// Body text flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStyle {
    Report,
    Letter,
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    font: Font,
    size: f32,
    leading: f32,
    space_before: f32,
    space_after: f32,
    centered: bool,
}

impl TextStyle {
    const fn new(font: Font, size: f32, leading: f32, space_before: f32, space_after: f32) -> Self {
        Self { font, size, leading, space_before, space_after, centered: false }
    }

    const fn centered(mut self) -> Self {
        self.centered = true;
        self
    }
}

const TITLE: TextStyle = TextStyle::new(Font::Bold, 18.0, 22.0, 0.0, 4.0).centered();
const CAPTION: TextStyle = TextStyle::new(Font::Regular, 9.0, 11.0, 0.0, 14.0).centered();
const HEADING_1: TextStyle = TextStyle::new(Font::Bold, 16.0, 20.0, 10.0, 6.0);
const HEADING_2: TextStyle = TextStyle::new(Font::Bold, 13.0, 17.0, 10.0, 4.0);
const HEADING_3: TextStyle = TextStyle::new(Font::Bold, 11.0, 14.0, 8.0, 3.0);
const BODY: TextStyle = TextStyle::new(Font::Regular, 10.0, 14.0, 0.0, 4.0);
const LETTER: TextStyle = TextStyle::new(Font::Regular, 11.0, 14.0, 0.0, 6.0);
const CODE: TextStyle = TextStyle::new(Font::Mono, 9.0, 11.0, 2.0, 4.0);

/// Word (or glued fragment) with its face
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    font: Font,
    space_before: bool,
    break_before: bool,
}

/// Split spans into pieces; fragments not separated by whitespace stay glued
fn pieces(spans: &[Span], base: Font) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut word = String::new();
    let mut space = false;
    let mut hard_break = false;

    for span in spans {
        let font = match base {
            Font::Mono => Font::Mono,
            base => Font::styled(span.bold || base == Font::Bold, span.italic),
        };
        for c in span.text.chars() {
            if c == '\n' || c.is_whitespace() {
                if !word.is_empty() {
                    out.push(Piece {
                        text: std::mem::take(&mut word),
                        font,
                        space_before: space,
                        break_before: hard_break,
                    });
                    space = false;
                    hard_break = false;
                }
                if c == '\n' {
                    hard_break = true;
                } else {
                    space = true;
                }
            } else {
                word.push(c);
            }
        }
        if !word.is_empty() {
            out.push(Piece {
                text: std::mem::take(&mut word),
                font,
                space_before: space,
                break_before: hard_break,
            });
            space = false;
            hard_break = false;
        }
    }
    out
}

/// Greedy line filling; over-long words are split by character
fn wrap(pieces: Vec<Piece>, size: f32, width: f32) -> Vec<Vec<Piece>> {
    let mut lines: Vec<Vec<Piece>> = Vec::new();
    let mut line: Vec<Piece> = Vec::new();
    let mut used = 0.0;

    for piece in pieces.into_iter().flat_map(|p| split_long(p, size, width)) {
        let gap = if piece.space_before && !line.is_empty() {
            text_width(" ", piece.font, size)
        } else {
            0.0
        };
        let w = text_width(&piece.text, piece.font, size);

        if !line.is_empty() && (piece.break_before || used + gap + w > width) {
            lines.push(std::mem::take(&mut line));
            used = 0.0;
        }
        used += if line.is_empty() { w } else { gap + w };
        line.push(piece);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn split_long(piece: Piece, size: f32, width: f32) -> Vec<Piece> {
    if text_width(&piece.text, piece.font, size) <= width {
        return vec![piece];
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in piece.text.chars() {
        let mut candidate = current.clone();
        candidate.push(c);
        if !current.is_empty() && text_width(&candidate, piece.font, size) > width {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Piece {
            text,
            font: piece.font,
            space_before: i == 0 && piece.space_before,
            break_before: i == 0 && piece.break_before,
        })
        .collect()
}

/// Cursor writing runs top to bottom, breaking pages as needed
struct Layouter {
    pages: Vec<Page>,
    current: Page,
    y: f32,
    body: TextStyle,
}

impl Layouter {
    fn new(body: BodyStyle) -> Self {
        Self {
            pages: Vec::new(),
            current: Page::default(),
            y: PAGE_HEIGHT - MARGIN,
            body: match body {
                BodyStyle::Report => BODY,
                BodyStyle::Letter => LETTER,
            },
        }
    }

    fn at_top(&self) -> bool {
        self.y >= PAGE_HEIGHT - MARGIN
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure(&mut self, height: f32) {
        if !self.at_top() && self.y - height < MARGIN {
            self.break_page();
        }
    }

    fn skip(&mut self, height: f32) {
        if self.at_top() {
            return;
        }
        self.y -= height;
        if self.y < MARGIN {
            self.break_page();
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Title(text) => self.text(&[Span::plain(text.as_str())], TITLE, 0.0, None),
            Block::Caption(text) => self.text(&[Span::plain(text.as_str())], CAPTION, 0.0, None),
            Block::Heading { level, spans } => {
                let style = match level {
                    1 => HEADING_1,
                    2 => HEADING_2,
                    _ => HEADING_3,
                };
                // Keep the heading with at least one body line
                self.skip(style.space_before);
                self.ensure(style.leading + self.body.leading);
                self.text(spans, TextStyle { space_before: 0.0, ..style }, 0.0, None);
            }
            Block::Paragraph(spans) => {
                let body = self.body;
                self.text(spans, body, 0.0, None);
            }
            Block::Bullets(items) => self.list(items, |_| "\u{2022}".to_string()),
            Block::Numbered(items) => self.list(items, |i| format!("{}.", i + 1)),
            Block::Code(text) => self.code(text),
            Block::Spacer => self.skip(SPACER_HEIGHT),
        }
    }

    fn list(&mut self, items: &[Vec<Span>], marker: impl Fn(usize) -> String) {
        let body = self.body;
        for (i, item) in items.iter().enumerate() {
            let style = TextStyle { space_after: ITEM_GAP, ..body };
            self.text(item, style, LIST_TEXT_INDENT, Some(marker(i)));
        }
        self.skip(body.space_after);
    }

    fn text(&mut self, spans: &[Span], style: TextStyle, indent: f32, marker: Option<String>) {
        self.skip(style.space_before);
        let width = CONTENT_WIDTH - indent;
        let lines = wrap(pieces(spans, style.font), style.size, width);

        for (n, line) in lines.iter().enumerate() {
            self.ensure(style.leading);
            let baseline = self.y - style.size;

            let line_width = line_width(line, style.size);
            let mut x = if style.centered {
                (PAGE_WIDTH - line_width) / 2.0
            } else {
                MARGIN + indent
            };

            if n == 0 {
                if let Some(marker) = &marker {
                    self.current.runs.push(Run {
                        x: MARGIN + LIST_MARKER_INDENT,
                        y: baseline,
                        font: style.font,
                        size: style.size,
                        text: marker.clone(),
                    });
                }
            }

            let mut run: Option<Run> = None;
            for (k, piece) in line.iter().enumerate() {
                let space = k > 0 && piece.space_before;
                if space {
                    x += text_width(" ", piece.font, style.size);
                }
                match &mut run {
                    Some(r) if r.font == piece.font => {
                        if space {
                            r.text.push(' ');
                        }
                        r.text.push_str(&piece.text);
                    }
                    _ => {
                        if let Some(done) = run.take() {
                            self.current.runs.push(done);
                        }
                        run = Some(Run {
                            x,
                            y: baseline,
                            font: piece.font,
                            size: style.size,
                            text: piece.text.clone(),
                        });
                    }
                }
                x += text_width(&piece.text, piece.font, style.size);
            }
            if let Some(done) = run {
                self.current.runs.push(done);
            }
            self.y -= style.leading;
        }
        self.skip(style.space_after);
    }

    fn code(&mut self, text: &str) {
        let style = CODE;
        let per_line = (CONTENT_WIDTH / (0.6 * style.size)).floor().max(1.0) as usize;
        self.skip(style.space_before);

        for source in text.lines() {
            let chars: Vec<char> = source.chars().map(|c| if c == '\t' { ' ' } else { c }).collect();
            let chunks: Vec<String> = if chars.is_empty() {
                vec![String::new()]
            } else {
                chars.chunks(per_line).map(|c| c.iter().collect()).collect()
            };
            for chunk in chunks {
                self.ensure(style.leading);
                if !chunk.trim().is_empty() {
                    self.current.runs.push(Run {
                        x: MARGIN,
                        y: self.y - style.size,
                        font: style.font,
                        size: style.size,
                        text: chunk,
                    });
                }
                self.y -= style.leading;
            }
        }
        self.skip(style.space_after);
    }

    fn finish(mut self) -> Vec<Page> {
        if !self.current.runs.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn line_width(line: &[Piece], size: f32) -> f32 {
    line.iter()
        .enumerate()
        .map(|(k, p)| {
            let gap = if k > 0 && p.space_before { text_width(" ", p.font, size) } else { 0.0 };
            gap + text_width(&p.text, p.font, size)
        })
        .sum()
}

/// Lay blocks out onto A4 pages. Always yields at least one page.
pub fn layout(blocks: &[Block], body: BodyStyle) -> Vec<Page> {
    let mut layouter = Layouter::new(body);
    for block in blocks {
        layouter.block(block);
    }
    layouter.finish()
}
