///
/// Descriptor Files
///
/// On disk a descriptor is stored one row per line. Fields are separated
/// by a NUL byte or by the two-character escape `\0`, so a table can be
/// written by hand in any editor. `DescriptorSource` keeps the raw
/// text together with the byte range of every row, which lets the
/// diagnostic reporter point at the offending line.
///

use std::ops::Range;

use crate::error::LinkError;

use super::{decode, ModuleDescriptor, FIELD_SEPARATOR};

const ESCAPED_SEPARATOR: &str = "\\0";

#[derive(Debug, Clone)]
pub struct DescriptorSource {
    pub name: String,
    pub text: String,
    rows: Vec<String>,
    spans: Vec<Range<usize>>,
}

impl DescriptorSource {
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, LinkError> {
        let mut rows = Vec::new();
        let mut spans = Vec::new();
        let mut start = 0;

        let ends = memchr::memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
        for end in ends {
            let line = &bytes[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let is_trailing = end == bytes.len() && line.is_empty();

            if !is_trailing {
                let row = std::str::from_utf8(line)
                    .map_err(|_| LinkError::malformed(rows.len(), "row is not valid UTF-8"))?;
                rows.push(row.replace(ESCAPED_SEPARATOR, "\0"));
                spans.push(start..start + line.len());
            }
            start = end + 1;
        }

        Ok(Self {
            name: name.into(),
            text: String::from_utf8_lossy(bytes).into_owned(),
            rows,
            spans,
        })
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn decode(&self) -> Result<ModuleDescriptor, LinkError> {
        decode(&self.rows)
    }

    /// Byte range of row `index` within `text`.
    pub fn row_span(&self, index: usize) -> Option<Range<usize>> {
        self.spans.get(index).cloned()
    }

    /// Row declaring `name`. With `last` set the final declaration is
    /// returned, which is where a duplicate is reported.
    pub fn row_of_symbol(&self, name: &str, last: bool) -> Option<usize> {
        let mut declared = self.rows.iter().enumerate().filter(|(_, row)| {
            let mut fields = row.split(FIELD_SEPARATOR);
            matches!(fields.next(), Some("F" | "O")) && fields.next() == Some(name)
        });
        let found = if last { declared.last() } else { declared.next() };
        found.map(|(i, _)| i)
    }
}

pub fn decode_blob(bytes: &[u8]) -> Result<ModuleDescriptor, LinkError> {
    DescriptorSource::from_bytes("<blob>", bytes)?.decode()
}

/// Renders rows in the escaped one-row-per-line file form.
pub fn render_rows<S: AsRef<str>>(rows: &[S]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.as_ref().replace(FIELD_SEPARATOR, ESCAPED_SEPARATOR));
        out.push('\n');
    }
    out
}
