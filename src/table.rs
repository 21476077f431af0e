//! Plain CSV tables on both ends of an alignment run.
//!
//! The line table holds one detected line per row in columns named `file`,
//! `rho` and `theta`; other columns are ignored. Fields are split on commas
//! without quoting.

use crate::{error::Error, sequence::TranslationRecord};
use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

/// One detected line as read from the line table.
#[derive(Clone, Debug, PartialEq)]
pub struct LineRow {
    pub file: String,
    pub rho: f64,
    pub theta: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineTable {
    rows: Vec<LineRow>,
}

impl LineTable {
    pub fn new(rows: Vec<LineRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[LineRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<LineRow> {
        self.rows
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::read_csv(BufReader::new(File::open(path)?))
    }

    /// Reads a line table, rejecting rows with missing, unparsable or
    /// non-finite fields.
    ///
    /// Row numbers in errors count lines from 1 including the header.
    pub fn read_csv<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut lines = reader.lines().enumerate();

        let Some((_, header)) = lines.next() else {
            return Ok(Self::default());
        };
        let columns = Columns::from_header(&header?)?;

        let mut rows = Vec::new();
        for (index, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            rows.push(columns.parse(index + 1, &line)?);
        }

        Ok(Self { rows })
    }
}

/// Positions of the required columns within a row.
struct Columns {
    file: usize,
    rho: usize,
    theta: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, Error> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |name: &str| {
            names
                .iter()
                .position(|column| *column == name)
                .ok_or_else(|| Error::MalformedRow {
                    row: 1,
                    reason: format!("header has no `{name}` column"),
                })
        };

        Ok(Self {
            file: find("file")?,
            rho: find("rho")?,
            theta: find("theta")?,
        })
    }

    fn parse(&self, row: usize, line: &str) -> Result<LineRow, Error> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |index: usize, name: &str| {
            fields.get(index).copied().ok_or_else(|| Error::MalformedRow {
                row,
                reason: format!("missing `{name}` field"),
            })
        };
        let number = |index: usize, name: &str| -> Result<f64, Error> {
            let value = field(index, name)?;
            let parsed: f64 = value.parse().map_err(|_| Error::MalformedRow {
                row,
                reason: format!("`{name}` is not a number: {value:?}"),
            })?;
            if !parsed.is_finite() {
                return Err(Error::MalformedRow {
                    row,
                    reason: format!("`{name}` is not finite: {value:?}"),
                });
            }
            Ok(parsed)
        };

        let file = field(self.file, "file")?;
        if file.is_empty() {
            return Err(Error::MalformedRow {
                row,
                reason: "empty `file` field".into(),
            });
        }

        Ok(LineRow {
            file: file.to_owned(),
            rho: number(self.rho, "rho")?,
            theta: number(self.theta, "theta")?,
        })
    }
}

/// Writes the translation table with header `file,ref,x,y`.
///
/// Fallback records carry no estimate and are skipped unless
/// `include_fallbacks` is set.
pub fn write_translations<W: Write>(
    mut writer: W,
    records: &[TranslationRecord],
    include_fallbacks: bool,
) -> Result<(), Error> {
    writeln!(writer, "file,ref,x,y")?;
    for record in records {
        if record.is_fallback() && !include_fallbacks {
            continue;
        }

        writeln!(
            writer,
            "{},{},{},{}",
            record.frame, record.reference, record.translation.dx, record.translation.dy
        )?;
    }

    writer.flush()?;
    Ok(())
}
