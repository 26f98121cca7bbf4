//! Serialization of a [`LeadChunk`] into its CSV envelope.
//!
//! Row 0 holds the fixed fields in this order:
//!
//! ```text
//! version, flags, request target, status code, content length, method, http version, status message, content type
//! ```
//!
//! Every following row is a header: its name, then each of its values. Absent
//! strings are written as empty fields and read back as `None`.

use bytes::Bytes;
use http::{HeaderName, HeaderValue};

use crate::codec::header::csv::{decode_rows, encode_rows};
use crate::ensure;
use crate::protocol::{LEAD_CHUNK_VERSION, LeadChunk, QuasiHttpError};

const FIXED_FIELD_COUNT: usize = 9;

pub(crate) fn serialize_envelope(lead_chunk: &LeadChunk) -> Result<Bytes, QuasiHttpError> {
    let mut rows = Vec::with_capacity(lead_chunk.headers.keys_len() + 1);
    rows.push(vec![
        lead_chunk.version.to_string(),
        lead_chunk.flags.to_string(),
        optional(&lead_chunk.request_target),
        lead_chunk.status_code.to_string(),
        lead_chunk.content_length.to_string(),
        optional(&lead_chunk.method),
        optional(&lead_chunk.http_version),
        optional(&lead_chunk.http_status_message),
        optional(&lead_chunk.content_type),
    ]);

    for name in lead_chunk.headers.keys() {
        let mut row = vec![name.as_str().to_string()];
        for value in lead_chunk.headers.get_all(name) {
            let value = value
                .to_str()
                .map_err(|_| QuasiHttpError::malformed_envelope(format!("header {name} has a non visible ascii value")))?;
            row.push(value.to_string());
        }
        rows.push(row);
    }

    Ok(Bytes::from(encode_rows(&rows)))
}

pub(crate) fn deserialize_envelope(data: &[u8]) -> Result<LeadChunk, QuasiHttpError> {
    let text = std::str::from_utf8(data).map_err(|_| QuasiHttpError::malformed_envelope("envelope is not utf-8"))?;
    let mut rows = decode_rows(text)?.into_iter();

    let fixed = rows.next().ok_or_else(|| QuasiHttpError::malformed_envelope("envelope has no rows"))?;
    ensure!(
        fixed.len() == FIXED_FIELD_COUNT,
        QuasiHttpError::malformed_envelope(format!("expect {FIXED_FIELD_COUNT} envelope fields, got {}", fixed.len()))
    );

    let mut fields = fixed.into_iter();
    let mut next_field = || fields.next().unwrap_or_default();

    let version: u8 = parse_number(next_field(), "version")?;
    ensure!(
        version == LEAD_CHUNK_VERSION,
        QuasiHttpError::malformed_envelope(format!("unsupported envelope version {version}"))
    );

    let mut lead_chunk = LeadChunk {
        version,
        flags: parse_number(next_field(), "flags")?,
        request_target: absent_if_empty(next_field()),
        status_code: parse_number(next_field(), "status code")?,
        content_length: parse_number(next_field(), "content length")?,
        method: absent_if_empty(next_field()),
        http_version: absent_if_empty(next_field()),
        http_status_message: absent_if_empty(next_field()),
        content_type: absent_if_empty(next_field()),
        ..LeadChunk::default()
    };

    for row in rows {
        let mut row = row.into_iter();
        let Some(name) = row.next() else { continue };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| QuasiHttpError::malformed_envelope(format!("invalid header name: {name}")))?;
        for value in row {
            let value = HeaderValue::from_str(&value)
                .map_err(|_| QuasiHttpError::malformed_envelope(format!("invalid value for header {name}")))?;
            lead_chunk.headers.append(name.clone(), value);
        }
    }

    Ok(lead_chunk)
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn absent_if_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn parse_number<T: std::str::FromStr>(value: String, field: &str) -> Result<T, QuasiHttpError> {
    value.parse().map_err(|_| QuasiHttpError::malformed_envelope(format!("invalid {field}: {value:?}")))
}
