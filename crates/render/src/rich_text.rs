// Light Markdown to rich text: block structure and inline emphasis

/// Inline text run with emphasis flags. May contain `\n` hard breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: false, italic: false }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: true, italic: false }
    }

    pub fn italic(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: false, italic: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Document title, centered
    Title(String),
    /// Small centered line under the title
    Caption(String),
    Heading { level: u8, spans: Vec<Span> },
    Paragraph(Vec<Span>),
    Bullets(Vec<Vec<Span>>),
    Numbered(Vec<Vec<Span>>),
    /// Preformatted monospace text
    Code(String),
    Spacer,
}

enum ListState {
    Normal,
    Unordered(Vec<Vec<Span>>),
    Ordered(Vec<Vec<Span>>),
}

struct BlockParser {
    blocks: Vec<Block>,
    list: ListState,
}

impl BlockParser {
    fn new() -> Self {
        Self { blocks: Vec::new(), list: ListState::Normal }
    }

    fn feed(&mut self, raw: &str) {
        let line = raw.trim_end();

        if line.trim().is_empty() {
            self.flush();
            self.blocks.push(Block::Spacer);
            return;
        }

        if let Some((level, text)) = heading(line) {
            self.flush();
            self.blocks.push(Block::Heading { level, spans: parse_inline(text) });
            return;
        }

        if let Some(item) = ordered_item(line) {
            self.push_ordered(parse_inline(item));
            return;
        }

        if let Some(item) = bullet_item(line) {
            self.push_unordered(parse_inline(item));
            return;
        }

        self.flush();
        self.blocks.push(Block::Paragraph(parse_inline(line.trim())));
    }

    fn push_unordered(&mut self, item: Vec<Span>) {
        if let ListState::Unordered(items) = &mut self.list {
            items.push(item);
            return;
        }
        self.flush();
        self.list = ListState::Unordered(vec![item]);
    }

    fn push_ordered(&mut self, item: Vec<Span>) {
        if let ListState::Ordered(items) = &mut self.list {
            items.push(item);
            return;
        }
        self.flush();
        self.list = ListState::Ordered(vec![item]);
    }

    fn flush(&mut self) {
        match std::mem::replace(&mut self.list, ListState::Normal) {
            ListState::Normal => {}
            ListState::Unordered(items) => self.blocks.push(Block::Bullets(items)),
            ListState::Ordered(items) => self.blocks.push(Block::Numbered(items)),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

/// Parse Markdown-ish text into blocks, line by line
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut parser = BlockParser::new();
    for line in markdown.lines() {
        parser.feed(line);
    }
    parser.finish()
}

fn heading(line: &str) -> Option<(u8, &str)> {
    if let Some(rest) = line.strip_prefix("### ") {
        Some((3, rest.trim()))
    } else if let Some(rest) = line.strip_prefix("## ") {
        Some((2, rest.trim()))
    } else {
        line.strip_prefix("# ").map(|rest| (1, rest.trim()))
    }
}

/// `N. text` with optional leading whitespace
fn ordered_item(line: &str) -> Option<&str> {
    let rest = line.trim_start();
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = rest[digits..].strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}

fn bullet_item(line: &str) -> Option<&str> {
    let rest = line.trim_start();
    rest.strip_prefix("- ")
        .or_else(|| rest.strip_prefix("* "))
        .map(str::trim)
}

/// Parse `**bold**`, `*italic*` and `_italic_` markers into spans.
///
/// Markers never span a line break; unmatched markers stay literal.
pub fn parse_inline(text: &str) -> Vec<Span> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    scan(&chars, false, &mut spans);
    merge(spans)
}

fn scan(chars: &[char], bold: bool, out: &mut Vec<Span>) {
    let mut plain = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if !bold && c == '*' && chars.get(i + 1) == Some(&'*') {
            if let Some(end) = find_bold_close(chars, i + 2) {
                push_text(out, &mut plain, false, false);
                scan(&chars[i + 2..end], true, out);
                i = end + 2;
                continue;
            }
        }

        if c == '*' || c == '_' {
            if let Some(end) = find_italic_close(chars, i) {
                push_text(out, &mut plain, bold, false);
                out.push(Span {
                    text: chars[i + 1..end].iter().collect(),
                    bold,
                    italic: true,
                });
                i = end + 1;
                continue;
            }
        }

        plain.push(c);
        i += 1;
    }

    push_text(out, &mut plain, bold, false);
}

fn push_text(out: &mut Vec<Span>, buf: &mut String, bold: bool, italic: bool) {
    if !buf.is_empty() {
        out.push(Span { text: std::mem::take(buf), bold, italic });
    }
}

/// Closing `**` for content starting at `start`; content must be non-empty
fn find_bold_close(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j + 1 < chars.len() {
        if chars[j - 1] == '\n' {
            return None;
        }
        if chars[j] == '*' && chars[j + 1] == '*' {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn find_italic_close(chars: &[char], open: usize) -> Option<usize> {
    let marker = chars[open];
    if open > 0 && chars[open - 1] == marker {
        return None;
    }
    let first = *chars.get(open + 1)?;
    if first.is_whitespace() || first == marker {
        return None;
    }
    // Underscores inside identifiers are not emphasis
    if marker == '_' && open > 0 && chars[open - 1].is_alphanumeric() {
        return None;
    }

    let mut j = open + 2;
    while j < chars.len() {
        let c = chars[j];
        if c == '\n' {
            return None;
        }
        if c == marker && !chars[j - 1].is_whitespace() {
            let next = chars.get(j + 1).copied();
            let closes = next != Some(marker)
                && (marker == '*' || !next.is_some_and(char::is_alphanumeric));
            if closes {
                return Some(j);
            }
        }
        j += 1;
    }
    None
}

fn merge(spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if last.bold == span.bold && last.italic == span.italic => {
                last.text.push_str(&span.text);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Flatten spans back to their visible text
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}
