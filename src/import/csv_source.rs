//! CSV input adapter for the CLI: a header-first export of the product template
//! becomes the ordered `RawRow` sequence.

use std::io::Read;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use tracing::warn;

use super::row::{headers, Cell, RawRow};

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let header_row = rdr.headers().context("reading CSV header")?.clone();
    let columns = template_columns(&header_row);

    let mut rows = Vec::new();
    let mut rec = StringRecord::new();
    while rdr.read_record(&mut rec).context("reading CSV record")? {
        let mut row = RawRow::new();
        for (header, idx) in &columns {
            let cell = rec
                .get(*idx)
                .filter(|v| !v.trim().is_empty())
                .map(|v| Cell::Text(v.to_string()));
            row.set(header, cell);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Column index for every template header present in the file.
fn template_columns(header_row: &StringRecord) -> Vec<(&'static str, usize)> {
    let mut out = Vec::with_capacity(headers::ALL.len());
    for header in headers::ALL {
        match header_row
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(header))
        {
            Some(idx) => out.push((header, idx)),
            None => warn!(header, "template column missing from CSV; treating as empty"),
        }
    }
    out
}
