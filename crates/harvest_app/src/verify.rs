//! `harvest verify`: re-read archive files and check their payload digests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use harvest_engine::{read_records, verify_payload_digest, RecordType};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub responses: usize,
    pub verified: usize,
    pub mismatched: Vec<String>,
}

/// Checks one archive file. Framing errors are returned as `Err`; digest
/// mismatches are listed by record id in the report.
pub fn verify_file(path: &Path) -> Result<FileReport> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let records = read_records(&bytes).with_context(|| format!("parsing {}", path.display()))?;

    let mut report = FileReport::default();
    for record in records
        .iter()
        .filter(|record| record.record_type() == Some(RecordType::Response))
    {
        report.responses += 1;
        if verify_payload_digest(record) == Some(true) {
            report.verified += 1;
        } else {
            let id = record.header("WARC-Record-ID").unwrap_or("<no record id>");
            report.mismatched.push(id.to_string());
        }
    }
    Ok(report)
}

pub fn run(archives: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in archives {
        match verify_file(path) {
            Ok(report) if report.mismatched.is_empty() => {
                println!(
                    "{}: {} of {} responses ok",
                    path.display(),
                    report.verified,
                    report.responses
                );
            }
            Ok(report) => {
                failed += 1;
                println!(
                    "{}: {} of {} responses failed digest check",
                    path.display(),
                    report.mismatched.len(),
                    report.responses
                );
                for id in &report.mismatched {
                    println!("  {id}");
                }
            }
            Err(err) => {
                failed += 1;
                println!("{}: {err:#}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} archive files failed verification", archives.len());
    }
    Ok(())
}
