//! JSON line output for the CLI

use std::io::{self, Write};

use serde::Serialize;

use super::errors::CliResult;

/// Writes `value` as one JSON line.
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes an error line to stderr.
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_json(&mut io::stderr(), &response)
}
