//! SVG error panels returned in place of images that could not be produced.
//!
//! Rendering is infallible: any message, including empty, enormous or
//! control-character-laden input, yields a well-formed SVG document.

use crate::domain::error::ErrorKind;

const BACKGROUND_COLOR: &str = "#FEE2E2";
const TEXT_COLOR: &str = "#DC2626";
const TITLE_COLOR: &str = "#991B1B";
const NATURAL_BREAKS: [char; 4] = ['/', '-', '_', '.'];

/// Geometry and wrapping limits for error panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorImageStyle {
    pub width: u32,
    pub min_height: u32,
    pub padding: u32,
    pub font_size: u32,
    pub title_font_size: u32,
    pub max_chars_per_line: usize,
    pub max_lines: usize,
}

impl Default for ErrorImageStyle {
    fn default() -> Self {
        Self {
            width: 600,
            min_height: 200,
            padding: 20,
            font_size: 16,
            title_font_size: 20,
            max_chars_per_line: 55,
            max_lines: 40,
        }
    }
}

impl ErrorImageStyle {
    fn line_height(&self) -> u32 {
        self.font_size * 7 / 5
    }

    fn title_height(&self) -> u32 {
        self.title_font_size * 3 / 2
    }

    fn message_top(&self) -> u32 {
        self.padding + self.title_height() + 30
    }
}

/// Laid-out content of one error panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorImageSpec {
    pub kind: ErrorKind,
    pub title: &'static str,
    pub message_lines: Vec<String>,
    pub width: u32,
    pub height: u32,
}

impl ErrorImageSpec {
    /// Wrap `message` and size the canvas so every kept line fits.
    pub fn layout(kind: ErrorKind, message: &str, style: &ErrorImageStyle) -> Self {
        let max_chars = style.max_chars_per_line.max(1);
        let max_lines = style.max_lines.max(1);

        let mut message_lines = wrap_text(&sanitize(message), max_chars);
        if message_lines.len() > max_lines {
            let hidden = message_lines.len() - (max_lines - 1);
            message_lines.truncate(max_lines - 1);
            message_lines.push(format!("... ({hidden} more lines)"));
        }

        let content_height = style.padding * 2
            + style.title_height()
            + style.line_height() * message_lines.len() as u32
            + 20;

        Self {
            kind,
            title: kind.title(),
            message_lines,
            width: style.width,
            height: content_height.max(style.min_height),
        }
    }
}

/// Produces error panels with a fixed style.
#[derive(Debug, Clone, Default)]
pub struct ErrorImageRenderer {
    style: ErrorImageStyle,
}

impl ErrorImageRenderer {
    pub fn new(style: ErrorImageStyle) -> Self {
        Self { style }
    }

    /// Render the panel for `kind` carrying `message` as an SVG document.
    pub fn render(&self, kind: ErrorKind, message: &str) -> String {
        let spec = ErrorImageSpec::layout(kind, message, &self.style);
        self.render_spec(&spec)
    }

    pub fn render_spec(&self, spec: &ErrorImageSpec) -> String {
        let style = &self.style;
        let ErrorImageSpec { width, height, .. } = *spec;
        let pad = style.padding;
        let icon_center = pad + 15;

        let mut svg = String::with_capacity(1024 + spec.message_lines.len() * 128);
        svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
        ));
        svg.push_str(&format!(
            "  <rect width=\"100%\" height=\"100%\" fill=\"{BACKGROUND_COLOR}\" rx=\"8\" ry=\"8\"/>\n"
        ));
        svg.push_str(&format!(
            "  <rect x=\"0\" y=\"0\" width=\"8\" height=\"100%\" fill=\"{TITLE_COLOR}\"/>\n"
        ));
        svg.push_str(&format!(
            "  <circle cx=\"{icon_center}\" cy=\"{icon_center}\" r=\"12\" fill=\"{TITLE_COLOR}\"/>\n"
        ));
        svg.push_str(&format!(
            "  <text x=\"{icon_center}\" y=\"{}\" fill=\"white\" font-size=\"16\" font-weight=\"bold\" text-anchor=\"middle\">!</text>\n",
            pad + 20
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" fill=\"{TITLE_COLOR}\" font-size=\"{}\" font-weight=\"bold\" font-family=\"sans-serif\">{}</text>\n",
            pad + 40,
            pad + 20,
            style.title_font_size,
            xml_escape(spec.title)
        ));

        let top = style.message_top();
        for (index, line) in spec.message_lines.iter().enumerate() {
            let y = top + index as u32 * style.line_height();
            svg.push_str(&format!(
                "  <text x=\"{pad}\" y=\"{y}\" fill=\"{TEXT_COLOR}\" font-size=\"{}\" font-family=\"monospace\" xml:space=\"preserve\">{}</text>\n",
                style.font_size,
                xml_escape(line)
            ));
        }

        svg.push_str("</svg>\n");
        svg
    }
}

/// Wrap `text` into lines of at most `max_chars` characters.
///
/// Newlines start a new paragraph. Words longer than a line are split by
/// [`break_long_word`].
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split(is_break).filter(|word| !word.is_empty()) {
            let word_len = word.chars().count();
            if word_len > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let mut chunks = break_long_word(word, max_chars);
                // The tail may still share a line with the next word.
                let tail = chunks.pop().unwrap_or_default();
                lines.extend(chunks);
                current_len = tail.chars().count();
                current = tail;
            } else if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_chars {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
                current_len = word_len;
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Whitespace the wrapper may break at; U+00A0 keeps its neighbours together.
fn is_break(c: char) -> bool {
    c.is_whitespace() && c != '\u{a0}'
}

/// Split a word with no spaces into chunks of at most `max_chars` characters.
///
/// Each chunk ends after the last `/`, `-`, `_` or `.` found in the back half
/// of the allowed width; without one the chunk is cut at exactly `max_chars`.
pub fn break_long_word(word: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut remaining: Vec<char> = word.chars().collect();
    let mut chunks = Vec::new();

    while remaining.len() > max_chars {
        let break_at = (max_chars / 2..max_chars)
            .rev()
            .find(|&index| NATURAL_BREAKS.contains(&remaining[index]))
            .map_or(max_chars, |index| index + 1);
        let rest = remaining.split_off(break_at);
        chunks.push(remaining.into_iter().collect());
        remaining = rest;
    }

    if !remaining.is_empty() {
        chunks.push(remaining.into_iter().collect());
    }
    chunks
}

/// Replace characters XML 1.0 cannot carry; newlines survive as paragraph breaks.
fn sanitize(message: &str) -> String {
    message
        .chars()
        .map(|ch| match ch {
            '\n' => '\n',
            '\u{FFFE}' | '\u{FFFF}' => '\u{FFFD}',
            ch if ch.is_control() => ' ',
            ch => ch,
        })
        .collect()
}

fn xml_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
