//! Minimal CSV rows used by the lead chunk envelope.
//!
//! Fields are separated by `,` and rows end with `\n`. A field is quoted when it
//! contains a separator, a quote or a line break, or when it is the only, empty field
//! of its row (so the row is not mistaken for a blank line). Quotes inside quoted
//! fields are doubled.

use crate::ensure;
use crate::protocol::QuasiHttpError;

pub(crate) fn encode_rows(rows: &[Vec<String>]) -> String {
    let mut text = String::new();
    for row in rows {
        for (index, field) in row.iter().enumerate() {
            if index > 0 {
                text.push(',');
            }
            let lone_empty = row.len() == 1 && field.is_empty();
            if lone_empty || field.contains([',', '"', '\r', '\n']) {
                text.push('"');
                text.push_str(&field.replace('"', "\"\""));
                text.push('"');
            } else {
                text.push_str(field);
            }
        }
        text.push('\n');
    }
    text
}

pub(crate) fn decode_rows(text: &str) -> Result<Vec<Vec<String>>, QuasiHttpError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    // a quoted field was opened in the current field, possibly still empty
    let mut quoted = false;
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                c => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                ensure!(field.is_empty() && !quoted, QuasiHttpError::malformed_envelope("unexpected quote in csv field"));
                quoted = true;
                in_quotes = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                quoted = false;
            }
            c => {
                ensure!(!quoted, QuasiHttpError::malformed_envelope("unexpected character after quoted csv field"));
                field.push(c);
            }
        }
    }

    ensure!(!in_quotes, QuasiHttpError::malformed_envelope("unterminated quoted csv field"));
    if quoted || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
