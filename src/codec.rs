//! Encoding of intermediate records and final output lines.
//!
//! Intermediate files hold one JSON object per line, `{"key":..,"value":..}`.
//! Output files hold one `<key> <value>` line per key.

use anyhow::{Context, Result};
use std::io::{Read, Write};

use crate::KeyValue;

/// Serialize `records` to `writer`, one JSON object per line.
pub fn write_records<'a, I>(writer: &mut dyn Write, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a KeyValue>,
{
    for kv in records {
        serde_json::to_writer(&mut *writer, kv).context("could not encode record")?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Decode every record in `reader`, appending to `out`.
///
/// Any malformed record fails the whole read.
pub fn read_records<R: Read>(reader: R, out: &mut Vec<KeyValue>) -> Result<()> {
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<KeyValue>();
    for (n, kv) in stream.enumerate() {
        out.push(kv.with_context(|| format!("could not decode record {n}"))?);
    }
    Ok(())
}

/// Write one final `<key> <value>` line.
#[inline]
pub fn write_output_line(writer: &mut dyn Write, key: &str, value: &str) -> Result<()> {
    writeln!(writer, "{key} {value}")?;
    Ok(())
}
