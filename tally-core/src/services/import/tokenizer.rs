//! CSV tokenizer
//!
//! Turns raw file text into a header row plus data rows. Implemented as a
//! two-state machine (`Unquoted` / `Quoted`) so that delimiters and line
//! breaks inside quoted fields, and `""` escapes, are handled exactly.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use serde::Serialize;

use crate::domain::result::{Error, Result};

/// Delimiters considered when sniffing, in tie-break order
const DELIMITER_CANDIDATES: [char; 4] = [',', ';', '\t', '|'];

/// Non-blank lines inspected when sniffing
const SNIFF_LINES: usize = 10;

/// A tokenized file: one header row and the data rows below it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub delimiter: char,
}

impl CsvTable {
    /// Build a table whose header is the `header_line`-th record (1-indexed).
    /// Records before it are preamble and are dropped.
    pub fn from_records(
        mut records: Vec<Vec<String>>,
        header_line: usize,
        delimiter: char,
    ) -> Result<Self> {
        let header_idx = header_line.max(1) - 1;
        if records.len() <= header_idx {
            return Err(Error::EmptyFile);
        }
        let rows = records.split_off(header_idx + 1);
        let headers = records
            .pop()
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        if rows.is_empty() {
            return Err(Error::NoData);
        }
        Ok(Self { headers, rows, delimiter })
    }

    /// Re-slice so the header is the `skip_header_rows`-th record of the
    /// original file
    pub fn with_header_at(self, skip_header_rows: usize) -> Result<Self> {
        if skip_header_rows <= 1 {
            return Ok(self);
        }
        let mut records = Vec::with_capacity(self.rows.len() + 1);
        records.push(self.headers);
        records.extend(self.rows);
        Self::from_records(records, skip_header_rows, self.delimiter)
    }

    /// Cell value by column index; short rows read as empty
    pub fn cell<'a>(row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Decode raw file bytes into text.
///
/// Honors UTF-8 and UTF-16 byte order marks, accepts plain UTF-8, and falls
/// back to Windows-1252 for legacy exports. Binary content is rejected.
pub fn decode(bytes: &[u8]) -> Result<String> {
    if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(Error::Encoding(format!("invalid {} content", encoding.name())));
        }
        return Ok(text.into_owned());
    }

    if bytes.contains(&0) {
        return Err(Error::Encoding(
            "file contains NUL bytes (binary or UTF-16 without byte order mark)".to_string(),
        ));
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            tracing::debug!("file is not valid UTF-8, decoding as Windows-1252");
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            Ok(text.into_owned())
        }
    }
}

/// Pick the delimiter whose count (outside quotes) is the same on the most
/// leading lines. A header and its data rows agree on the count, so a
/// preamble such as `Account: 1234` or a stray `;` inside one description
/// does not decide. Ties go to the larger per-line count, then to candidate
/// order. Comma is the default.
pub fn sniff_delimiter(text: &str) -> char {
    let lines: Vec<[usize; DELIMITER_CANDIDATES.len()]> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .map(unquoted_counts)
        .collect();

    let mut winner = DELIMITER_CANDIDATES[0];
    let mut best = (0usize, 0usize);
    for (i, candidate) in DELIMITER_CANDIDATES.iter().enumerate() {
        let score = consistency(lines.iter().map(|counts| counts[i]));
        if score > best {
            best = score;
            winner = *candidate;
        }
    }
    winner
}

fn unquoted_counts(line: &str) -> [usize; DELIMITER_CANDIDATES.len()] {
    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];
    let mut in_quotes = false;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = DELIMITER_CANDIDATES.iter().position(|d| *d == c) {
                counts[i] += 1;
            }
        }
    }
    counts
}

/// `(lines agreeing, count)` for the most common non-zero per-line count
fn consistency(counts: impl Iterator<Item = usize>) -> (usize, usize) {
    let mut tally: HashMap<usize, usize> = HashMap::new();
    for count in counts.filter(|c| *c > 0) {
        *tally.entry(count).or_default() += 1;
    }
    tally
        .into_iter()
        .map(|(count, lines)| (lines, count))
        .max()
        .unwrap_or_default()
}

/// Tokenize with a sniffed delimiter; the first record is the header
pub fn tokenize(text: &str) -> Result<CsvTable> {
    tokenize_with(text, sniff_delimiter(text))
}

/// Tokenize with an explicit delimiter; the first record is the header
pub fn tokenize_with(text: &str, delimiter: char) -> Result<CsvTable> {
    CsvTable::from_records(records(text, delimiter), 1, delimiter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unquoted,
    Quoted,
}

/// Split text into records of fields. Records whose fields are all blank
/// are dropped.
pub fn records(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut tokenizer = Tokenizer::new(delimiter);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        tokenizer.feed(c, &mut chars);
    }
    tokenizer.finish()
}

struct Tokenizer {
    delimiter: char,
    state: State,
    field: String,
    field_started: bool,
    record: Vec<String>,
    records: Vec<Vec<String>>,
}

impl Tokenizer {
    fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            state: State::Unquoted,
            field: String::new(),
            field_started: false,
            record: Vec::new(),
            records: Vec::new(),
        }
    }

    fn feed(&mut self, c: char, rest: &mut Peekable<Chars<'_>>) {
        match self.state {
            State::Unquoted => match c {
                '"' if !self.field_started => {
                    self.field_started = true;
                    self.state = State::Quoted;
                }
                '\r' => {
                    if rest.peek() == Some(&'\n') {
                        rest.next();
                    }
                    self.end_record();
                }
                '\n' => self.end_record(),
                c if c == self.delimiter => self.end_field(),
                c => {
                    self.field_started = true;
                    self.field.push(c);
                }
            },
            State::Quoted => {
                if c == '"' {
                    if rest.peek() == Some(&'"') {
                        rest.next();
                        self.field.push('"');
                    } else {
                        self.state = State::Unquoted;
                    }
                } else {
                    self.field.push(c);
                }
            }
        }
    }

    fn end_field(&mut self) {
        self.record.push(std::mem::take(&mut self.field));
        self.field_started = false;
    }

    fn end_record(&mut self) {
        self.end_field();
        let record = std::mem::take(&mut self.record);
        if record.iter().any(|f| !f.trim().is_empty()) {
            self.records.push(record);
        }
    }

    fn finish(mut self) -> Vec<Vec<String>> {
        if self.state == State::Quoted {
            tracing::warn!("unterminated quoted field at end of file");
        }
        if self.field_started || !self.record.is_empty() {
            self.end_record();
        }
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_file() {
        let table = tokenize("Date,Description,Amount\n2024-01-05,Coffee,-4.50\n").unwrap();
        assert_eq!(table.headers, vec!["Date", "Description", "Amount"]);
        assert_eq!(table.rows, vec![vec!["2024-01-05", "Coffee", "-4.50"]]);
        assert_eq!(table.delimiter, ',');
    }

    #[test]
    fn test_quoted_delimiter_and_escaped_quote() {
        let text = "Name,Item\n\"Smith, John\",\"5\"\" nail\"\n";
        let table = tokenize(text).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0], vec!["Smith, John", "5\" nail"]);
    }

    #[test]
    fn test_embedded_newline_and_crlf() {
        let text = "Date,Memo\r\n2024-01-01,\"line one\r\nline two\"\r\n2024-01-02,plain\r\n";
        let table = tokenize(text).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], "line one\r\nline two");
        assert_eq!(table.rows[1], vec!["2024-01-02", "plain"]);
    }

    #[test]
    fn test_no_trailing_newline_and_blank_lines() {
        let text = "A,B\n\n1,2\n,\n3,4";
        let table = tokenize(text).unwrap();
        assert_eq!(table.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn test_empty_quoted_field() {
        let table = tokenize("A,B,C\n\"\",x,\"\"\n").unwrap();
        assert_eq!(table.rows[0], vec!["", "x", ""]);
    }

    #[test]
    fn test_empty_file() {
        assert!(matches!(tokenize(""), Err(Error::EmptyFile)));
        assert!(matches!(tokenize("\n\r\n  \n"), Err(Error::EmptyFile)));
    }

    #[test]
    fn test_header_only() {
        assert!(matches!(tokenize("Date,Amount\n"), Err(Error::NoData)));
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("Datum;Betrag;Text\n01.02.2024;1,50;x"), ';');
        assert_eq!(sniff_delimiter("a\tb\tc"), '\t');
        assert_eq!(sniff_delimiter("\"a;b\",c"), ',');
        assert_eq!(sniff_delimiter("single"), ',');
        assert_eq!(
            sniff_delimiter("Statement for Smith, J\nDatum;Betrag;Text;Saldo\n01.02.2024;1,50;x;9"),
            ';'
        );
    }

    #[test]
    fn test_sniff_ignores_stray_delimiters_in_one_row() {
        let text = "Date,Description,Amount\n\
                    2024-01-01,POS;CARD 1234;REF 99;SHOP,-5\n\
                    2024-01-02,Paycheck,100\n";
        assert_eq!(sniff_delimiter(text), ',');

        let table = tokenize(text).unwrap();
        assert_eq!(table.headers, vec!["Date", "Description", "Amount"]);
        assert_eq!(table.rows[0][1], "POS;CARD 1234;REF 99;SHOP");

        // Same with only one data row
        assert_eq!(sniff_delimiter("Date|Memo|Amount\n2024-01-01|a,b,c,d|5"), '|');
    }

    #[test]
    fn test_header_at_preamble() {
        let text = "Account: 1234\nExported today\nDate,Amount\n2024-01-01,5\n";
        let recs = records(text, ',');
        let table = CsvTable::from_records(recs, 3, ',').unwrap();
        assert_eq!(table.headers, vec!["Date", "Amount"]);
        assert_eq!(table.rows.len(), 1);

        let recs = records(text, ',');
        assert!(matches!(CsvTable::from_records(recs, 9, ','), Err(Error::EmptyFile)));
    }

    #[test]
    fn test_with_header_at() {
        let table = tokenize("Bank export\nDate,Amount\n2024-01-01,5\n").unwrap();
        assert_eq!(table.headers, vec!["Bank export"]);

        let table = table.with_header_at(2).unwrap();
        assert_eq!(table.headers, vec!["Date", "Amount"]);
        assert_eq!(table.rows, vec![vec!["2024-01-01", "5"]]);

        let table = tokenize("Bank export\nDate,Amount\n").unwrap();
        assert!(matches!(table.with_header_at(2), Err(Error::NoData)));
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(decode(b"\xEF\xBB\xBFDate").unwrap(), "Date");
        assert_eq!(decode(b"Caf\xE9").unwrap(), "Caf\u{e9}");
        assert_eq!(decode(b"\xFF\xFEA\x00").unwrap(), "A");
        assert!(matches!(decode(b"A\x00B"), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_short_rows_read_empty() {
        let row = vec!["only".to_string()];
        assert_eq!(CsvTable::cell(&row, 0), "only");
        assert_eq!(CsvTable::cell(&row, 3), "");
    }
}
