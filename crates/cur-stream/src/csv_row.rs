//! Single-line CSV record tokenizer.
//!
//! One physical line is one record: a quote left open at the end of the line
//! is closed there and reported, never continued onto the next line.

/// Result of tokenizing one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRow {
    /// Trimmed field values. Empty when nothing could be extracted.
    pub fields: Vec<String>,
    /// Original byte length when the line was cut at `max_line_bytes`.
    pub truncated_from: Option<usize>,
    /// Fields beyond `max_fields` that were discarded.
    pub dropped_fields: usize,
    /// The line ended inside a quoted field.
    pub unclosed_quote: bool,
}

impl ParsedRow {
    /// `true` when the row was tokenized but something had to be repaired.
    pub fn has_issues(&self) -> bool {
        self.truncated_from.is_some() || self.dropped_fields > 0 || self.unclosed_quote
    }
}

/// Quote-aware comma splitter with soft limits on line length and field count.
#[derive(Debug, Clone, Copy)]
pub struct CsvRowParser {
    max_line_bytes: usize,
    max_fields: usize,
}

impl CsvRowParser {
    pub fn new(max_line_bytes: usize, max_fields: usize) -> Self {
        Self {
            max_line_bytes,
            max_fields,
        }
    }

    /// Split `line` into fields.
    ///
    /// `"` toggles quoting; inside a quoted field `""` is a literal quote.
    /// Commas outside quotes end the current field. Every field is trimmed.
    pub fn parse(&self, line: &str) -> ParsedRow {
        let mut row = ParsedRow::default();

        let line = if line.len() > self.max_line_bytes {
            row.truncated_from = Some(line.len());
            truncate_at_char_boundary(line, self.max_line_bytes)
        } else {
            line
        };

        if line.is_empty() {
            return row;
        }

        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    self.push_field(&mut row, &current);
                    current.clear();
                }
                _ => current.push(c),
            }
        }

        row.unclosed_quote = in_quotes;
        self.push_field(&mut row, &current);
        row
    }

    fn push_field(&self, row: &mut ParsedRow, value: &str) {
        if row.fields.len() < self.max_fields {
            row.fields.push(value.trim().to_string());
        } else {
            row.dropped_fields += 1;
        }
    }
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char
/// boundary.
pub(crate) fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
