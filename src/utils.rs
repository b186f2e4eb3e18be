use anyhow::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use crate::errors::{FileError, ParseError};

pub fn open_file(filename: &str) -> Result<BufReader<File>> {
    File::open(filename)
        .map(BufReader::new)
        .map_err(|source| FileError::CannotOpen { source, filename: filename.to_owned() }.into())
}

pub fn create_file<'a>(filename: &str) -> Result<BufWriter<Box<dyn Write + 'a>>> {
    let f = File::create(filename)
        .map_err(|source| FileError::WhileCreating { source, filename: filename.to_owned() })?;
    Ok(BufWriter::new(Box::new(f)))
}

/// Returns the meaningful lines of `filename`, paired with their 1-based line
/// number; blank lines and `#` comments are skipped.
pub fn data_lines(filename: &str) -> Result<Vec<(usize, String)>> {
    let mut r = Vec::new();
    for (i, l) in open_file(filename)?.lines().enumerate() {
        let l = l.with_context(|| format!("while reading {}", filename))?;
        let trimmed = l.trim_end();
        if trimmed.trim_start().is_empty() || trimmed.trim_start().starts_with('#') {
            continue;
        }
        r.push((i + 1, trimmed.to_owned()));
    }
    Ok(r)
}

pub fn parse_number(s: &str, filename: &str, line: usize) -> Result<usize> {
    s.trim().parse::<usize>().map_err(|_| {
        ParseError::NotANumber { filename: filename.to_owned(), line, found: s.to_owned() }.into()
    })
}

pub fn malformed(filename: &str, line: usize, reason: impl Into<String>) -> Error {
    ParseError::MalformedLine { filename: filename.to_owned(), line, reason: reason.into() }.into()
}

/// Write `rows` as a left-aligned text table, every column padded to its
/// widest cell.
pub fn write_table<W: Write, S: AsRef<str>>(rows: &[Vec<S>], indent: usize, out: &mut W) -> Result<()> {
    let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths = (0..ncols)
        .map(|j| {
            rows.iter().filter_map(|r| r.get(j)).map(|c| c.as_ref().chars().count()).max().unwrap_or(0)
        })
        .collect::<Vec<_>>();

    for row in rows {
        let mut line = " ".repeat(indent);
        for (j, cell) in row.iter().enumerate() {
            let cell = cell.as_ref();
            line.push_str(cell);
            if j + 1 < row.len() {
                line.push_str(&" ".repeat(widths[j] - cell.chars().count() + 2));
            }
        }
        writeln!(out, "{}", line)?;
    }

    Ok(out.flush()?)
}
