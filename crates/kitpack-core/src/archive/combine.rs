//! Merge a binary and a branch archive into one zip.
//!
//! The output holds the binary under a canonical entry name followed by
//! every entry of the source archive with its top-level folder removed.
//! Source entries are copied raw (compressed bytes and header metadata
//! untouched, only the name rewritten), so no entry is ever inflated into
//! memory. Names are unique in the output: the first entry written under a
//! name wins and later ones are skipped.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// What went into a combined archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineSummary {
    /// Entries copied from the source archive.
    pub copied: usize,
    /// Source entries dropped because nothing remained after flattening or
    /// because an earlier entry already took the flattened name.
    pub skipped: usize,
    /// Size of the binary entry.
    pub binary_bytes: u64,
}

/// Strip the first `/`-delimited segment of an entry name.
///
/// Returns `None` when nothing is left, which covers the root folder entry
/// itself and names without any separator.
pub fn flatten_entry_name(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once('/')?;
    (!rest.is_empty()).then_some(rest)
}

/// Write `binary` (as `binary_name`) and the flattened entries of
/// `source_zip` to a new archive at `output`.
///
/// The archive is assembled in a temporary file beside `output` and only
/// moved into place when complete, so a failure never leaves a partial
/// archive at `output`.
pub fn combine(
    binary: &Path,
    binary_name: &str,
    source_zip: &Path,
    output: &Path,
) -> Result<CombineSummary> {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io(format!("failed to create archive in {}", dir.display()), e))?;
    let handle = staging
        .reopen()
        .map_err(|e| Error::io("failed to open combined archive", e))?;

    let mut writer = ZipWriter::new(handle);
    let mut summary = CombineSummary {
        binary_bytes: add_binary(&mut writer, binary, binary_name)?,
        ..CombineSummary::default()
    };
    let mut names = HashSet::from([binary_name.to_string()]);
    add_flattened(&mut writer, source_zip, &mut names, &mut summary)?;
    writer
        .finish()
        .map_err(|e| Error::archive("failed to finalize combined archive", e))?;

    staging.persist(output).map_err(|e| {
        Error::io(
            format!("failed to move combined archive to {}", output.display()),
            e.error,
        )
    })?;

    tracing::info!(
        output = %output.display(),
        copied = summary.copied,
        skipped = summary.skipped,
        "combined archive written"
    );
    Ok(summary)
}

fn add_binary(writer: &mut ZipWriter<File>, binary: &Path, name: &str) -> Result<u64> {
    let mut file = File::open(binary)
        .map_err(|e| Error::io(format!("failed to open {}", binary.display()), e))?;
    let metadata = file
        .metadata()
        .map_err(|e| Error::io(format!("failed to stat {}", binary.display()), e))?;

    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(metadata.len() >= u64::from(u32::MAX));
    if let Some(modified) = metadata.modified().ok().and_then(zip_timestamp) {
        options = options.last_modified_time(modified);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
    }

    writer
        .start_file(name, options)
        .map_err(|e| Error::archive(format!("failed to add {name}"), e))?;
    let written = std::io::copy(&mut file, writer)
        .map_err(|e| Error::io(format!("failed to copy {} into archive", binary.display()), e))?;

    tracing::debug!(name, bytes = written, "added binary entry");
    Ok(written)
}

fn add_flattened(
    writer: &mut ZipWriter<File>,
    source_zip: &Path,
    names: &mut HashSet<String>,
    summary: &mut CombineSummary,
) -> Result<()> {
    let file = File::open(source_zip)
        .map_err(|e| Error::io(format!("failed to open {}", source_zip.display()), e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::archive(format!("failed to read {}", source_zip.display()), e))?;

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| Error::archive(format!("failed to read entry {i}"), e))?;
        let original = entry.name().to_string();

        let Some(flattened) = flatten_entry_name(&original) else {
            summary.skipped += 1;
            continue;
        };
        let flattened = flattened.to_string();
        if !names.insert(flattened.clone()) {
            tracing::warn!(entry = %original, name = %flattened, "skipping duplicate entry name");
            summary.skipped += 1;
            continue;
        }

        writer
            .raw_copy_file_rename(entry, flattened.clone())
            .map_err(|e| Error::archive(format!("failed to copy entry {original}"), e))?;
        tracing::trace!(from = %original, to = %flattened, "copied entry");
        summary.copied += 1;
    }

    Ok(())
}

/// Local wall-clock time in zip's DOS representation.
///
/// Times outside the DOS range (before 1980) yield `None` and the writer's
/// default timestamp is used instead.
fn zip_timestamp(time: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = time.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}
