//! Search result rendering
//!
//! A matching line is wrapped to the terminal width, breaking only between
//! words, with tabs expanded to fixed stops. Each display line is followed
//! by a marker line with `^` under every query word and spaces elsewhere,
//! aligned character for character.

/// Lines are never wrapped narrower than this
pub const MIN_WIDTH: usize = 80;

/// Tab stop interval
pub const TAB_WIDTH: usize = 8;

/// Expand tabs to spaces, counting columns in characters
pub fn expand_tabs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for ch in text.chars() {
        if ch == '\t' {
            let pad = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(pad));
            column += pad;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    out
}

/// Split into alternating runs of spaces and non-spaces
fn segments(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;
    for (i, ch) in text.char_indices() {
        let space = ch == ' ';
        if in_space.is_some_and(|s| s != space) {
            out.push(&text[start..i]);
            start = i;
        }
        in_space = Some(space);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

struct Row {
    text: String,
    marks: String,
    width: usize,
}

impl Row {
    fn new() -> Self {
        Self {
            text: String::new(),
            marks: String::new(),
            width: 0,
        }
    }

    fn push(&mut self, segment: &str, len: usize, mark: char) {
        self.text.push_str(segment);
        self.marks.extend(std::iter::repeat(mark).take(len));
        self.width += len;
    }

    fn finish(self, out: &mut Vec<String>) {
        out.push(self.text);
        out.push(self.marks.trim_end().to_string());
    }
}

/// Render `line` with query words marked, wrapped to `terminal_width`
///
/// Returns display lines in pairs: text, then its marker line.
pub fn underline<S: AsRef<str>>(line: &str, query: &[S], terminal_width: usize) -> Vec<String> {
    let width = terminal_width.max(MIN_WIDTH);
    let expanded = expand_tabs(line);
    let mut out = Vec::new();
    let mut row = Row::new();

    for segment in segments(&expanded) {
        let len = segment.chars().count();

        if segment.starts_with(' ') {
            if row.width + len > width {
                // wrap point: spaces are dropped
                if row.width > 0 {
                    std::mem::replace(&mut row, Row::new()).finish(&mut out);
                }
            } else {
                row.push(segment, len, ' ');
            }
            continue;
        }

        let mark = if query.iter().any(|q| q.as_ref() == segment) {
            '^'
        } else {
            ' '
        };

        if row.width + len > width && row.width > 0 {
            std::mem::replace(&mut row, Row::new()).finish(&mut out);
        }

        if len <= width {
            row.push(segment, len, mark);
            continue;
        }

        // a single word wider than the screen has to be cut
        let chars: Vec<char> = segment.chars().collect();
        for piece in chars.chunks(width) {
            if row.width > 0 {
                std::mem::replace(&mut row, Row::new()).finish(&mut out);
            }
            let piece: String = piece.iter().collect();
            row.push(&piece, piece.chars().count(), mark);
        }
    }

    if row.width > 0 || out.is_empty() {
        row.finish(&mut out);
    }
    out
}
