use std::io::Write;

use serde::Serialize;

use crate::Result;
use crate::tally::Tally;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordFrequency {
    pub word: String,
    pub frequency: u64,
}

/// Rows sorted by descending frequency, ties broken by ascending word.
pub fn rank(tally: &Tally) -> Vec<WordFrequency> {
    let mut rows: Vec<WordFrequency> = tally
        .iter()
        .map(|(word, frequency)| WordFrequency {
            word: word.to_string(),
            frequency,
        })
        .collect();
    rows.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.word.cmp(&b.word)));
    rows
}

pub fn write_csv<W: Write>(rows: &[WordFrequency], out: &mut W) -> Result<()> {
    writeln!(out, "word,frequency")?;
    for row in rows {
        writeln!(out, "{},{}", row.word, row.frequency)?;
    }
    Ok(())
}

pub fn write_json<W: Write>(rows: &[WordFrequency], out: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, rows)?;
    writeln!(out)?;
    Ok(())
}

pub fn write<W: Write>(format: OutputFormat, rows: &[WordFrequency], out: &mut W) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(rows, out),
        OutputFormat::Json => write_json(rows, out),
    }?;
    out.flush()?;
    Ok(())
}
