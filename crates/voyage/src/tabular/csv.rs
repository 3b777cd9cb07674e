//! RFC 4180 reader and writer.
//!
//! The reader is a character-level state machine. It accepts `\r\n`, `\n` and
//! lone `\r` line endings, doubled quotes inside quoted fields, and a final
//! record without a trailing newline. Blank lines are skipped.

use super::TableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At the beginning of a field.
    FieldStart,
    /// Inside an unquoted field.
    Unquoted,
    /// Inside a quoted field.
    Quoted,
    /// Just saw a quote while inside a quoted field.
    QuoteInQuoted,
}

struct Reader {
    records: Vec<Vec<String>>,
    record: Vec<String>,
    field: String,
    line: usize,
}

impl Reader {
    fn end_field(&mut self) {
        self.record.push(std::mem::take(&mut self.field));
    }

    fn end_record(&mut self) {
        self.end_field();
        let record = std::mem::take(&mut self.record);
        let blank = record.len() == 1 && record[0].is_empty();
        if !blank {
            self.records.push(record);
        }
    }
}

/// Parse CSV text into raw records.
pub fn parse_records(text: &str) -> Result<Vec<Vec<String>>, TableError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = Reader {
        records: Vec::new(),
        record: Vec::new(),
        field: String::new(),
        line: 1,
    };
    let mut state = State::FieldStart;
    let mut quote_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (state, c) {
            (State::Quoted, '"') => state = State::QuoteInQuoted,
            (State::Quoted, c) => {
                if c == '\n' {
                    reader.line += 1;
                }
                reader.field.push(c);
            }
            (State::QuoteInQuoted, '"') => {
                reader.field.push('"');
                state = State::Quoted;
            }
            (State::FieldStart, '"') => {
                quote_line = reader.line;
                state = State::Quoted;
            }
            (_, ',') => {
                reader.end_field();
                state = State::FieldStart;
            }
            (_, '\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                reader.line += 1;
                reader.end_record();
                state = State::FieldStart;
            }
            (_, '\n') => {
                reader.line += 1;
                reader.end_record();
                state = State::FieldStart;
            }
            // Stray characters after a closing quote, or a quote in the middle
            // of an unquoted field, are kept literally.
            (_, c) => {
                reader.field.push(c);
                state = State::Unquoted;
            }
        }
    }

    match state {
        State::Quoted => return Err(TableError::UnterminatedQuote { line: quote_line }),
        State::FieldStart if reader.record.is_empty() && reader.field.is_empty() => {}
        _ => reader.end_record(),
    }

    Ok(reader.records)
}

/// Quote a single field if it needs it.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Serialize a header row and data rows. Every line ends with `\r\n`.
pub fn write_records<S: AsRef<str>>(headers: &[S], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    push_line(&mut out, headers.iter().map(AsRef::as_ref));
    for row in rows {
        push_line(&mut out, row.iter().map(String::as_str));
    }
    out
}

fn push_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_simple_lf_and_crlf_lines() {
        let records = parse_records("a,b\r\n1,2\n3,4").unwrap();
        assert_eq!(records, vec![rec(&["a", "b"]), rec(&["1", "2"]), rec(&["3", "4"])]);
    }

    #[test]
    fn parses_quoted_fields_with_separators_and_escaped_quotes() {
        let records = parse_records("name,desc\n\"a,b\",\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(records[1], rec(&["a,b", "say \"hi\""]));
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let records = parse_records("k,v\r\nx,\"line one\r\nline two\"\r\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][1], "line one\r\nline two");
    }

    #[test]
    fn keeps_trailing_empty_field_and_unterminated_last_row() {
        let records = parse_records("a,b\n1,").unwrap();
        assert_eq!(records[1], rec(&["1", ""]));
    }

    #[test]
    fn skips_blank_lines_and_strips_bom() {
        let records = parse_records("\u{feff}a\n\n\nb\n").unwrap();
        assert_eq!(records, vec![rec(&["a"]), rec(&["b"])]);
    }

    #[test]
    fn lone_carriage_return_ends_a_record() {
        let records = parse_records("a\rb").unwrap();
        assert_eq!(records, vec![rec(&["a"]), rec(&["b"])]);
    }

    #[test]
    fn unterminated_quote_is_an_error_with_its_line() {
        let err = parse_records("a\n\"open,field\nmore").unwrap_err();
        assert_eq!(err, TableError::UnterminatedQuote { line: 2 });
    }

    #[test]
    fn empty_quoted_field_is_empty_string() {
        let records = parse_records("\"\",x").unwrap();
        assert_eq!(records[0], rec(&["", "x"]));
    }

    #[test]
    fn escape_field_only_quotes_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"x\""), "\"say \"\"x\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn written_output_parses_back_to_the_same_records() {
        let headers = ["Include", "Name", "Description"];
        let rows = vec![
            rec(&["yes", "gate, strict", "uses \"quotes\""]),
            rec(&["no", "multi", "line\r\nvalue"]),
            rec(&["", "", ""]),
        ];
        let text = write_records(&headers, &rows);
        let parsed = parse_records(&text).unwrap();
        assert_eq!(parsed[0], rec(&headers));
        assert_eq!(&parsed[1..], &rows[..]);
    }
}
