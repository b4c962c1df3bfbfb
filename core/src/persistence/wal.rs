use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::fsync::{ensure_parent_dir, sync_parent_dir, truncate_file_fully_synced};
use super::{PersistenceError, WalRecord};

/// Appends one `<crc32 hex> <json>` line.
pub(super) fn append_wal(
    path: &Path,
    record: &WalRecord,
    sync_on_write: bool,
) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;

    let existed = path.exists();
    let payload = serde_json::to_vec(record)?;
    let mut line = format!("{:08x} ", crc32fast::hash(&payload)).into_bytes();
    line.extend_from_slice(&payload);
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    discard_torn_tail(&mut file)?;
    let committed_len = file.metadata()?.len();
    if let Err(error) = write_line(&mut file, &line, sync_on_write) {
        if let Err(rollback) = file.set_len(committed_len) {
            tracing::warn!(
                path = %path.display(),
                error = %rollback,
                "failed to roll back partial wal append"
            );
        }
        return Err(error.into());
    }
    if !existed {
        sync_parent_dir(path)?;
    }
    Ok(())
}

fn write_line(file: &mut File, line: &[u8], sync_on_write: bool) -> std::io::Result<()> {
    file.write_all(line)?;
    if sync_on_write {
        file.flush()?;
        file.sync_data()?;
    }
    Ok(())
}

/// Cuts an unterminated final line left behind by an interrupted append,
/// so the next record starts on a line of its own.
fn discard_torn_tail(file: &mut File) -> Result<(), PersistenceError> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut window = vec![0u8; 4096];
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let start = end.saturating_sub(window.len() as u64);
        let chunk = &mut window[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(newline) = chunk.iter().rposition(|byte| *byte == b'\n') {
            keep = start + newline as u64 + 1;
            break;
        }
        end = start;
    }
    tracing::warn!(discarded = len - keep, "dropping unterminated wal tail before append");
    file.set_len(keep)?;
    Ok(())
}

pub(super) fn truncate_wal(path: &Path) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    truncate_file_fully_synced(path)
}

/// Feeds every intact record to `apply` and returns how many were read.
///
/// An unterminated, unreadable final line is a torn write: it is dropped
/// and the file is cut back to the last complete record.
pub(super) fn replay_wal(
    path: &Path,
    mut apply: impl FnMut(WalRecord) -> Result<(), PersistenceError>,
) -> Result<usize, PersistenceError> {
    if !path.exists() {
        return Ok(0);
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut line_number = 0usize;
    let mut records = 0usize;
    let mut valid_len = 0u64;
    let mut torn = false;

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let has_trailing_newline = line.ends_with('\n');
        let trimmed = line.trim();
        if trimmed.is_empty() {
            valid_len += read as u64;
            continue;
        }

        match decode_line(trimmed) {
            Ok(record) => {
                apply(record).map_err(|error| {
                    PersistenceError::InvalidData(format!(
                        "failed to apply wal line {line_number}: {error}"
                    ))
                })?;
                records += 1;
                valid_len += read as u64;
            }
            Err(reason) => {
                let at_end = reader
                    .fill_buf()
                    .map(|remaining| remaining.is_empty())
                    .unwrap_or(false);
                if !has_trailing_newline && at_end {
                    torn = true;
                    break;
                }
                return Err(PersistenceError::InvalidData(format!(
                    "invalid wal line {line_number}: {reason}"
                )));
            }
        }
    }

    if torn {
        tracing::warn!(path = %path.display(), line_number, "dropping torn wal tail");
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }
    Ok(records)
}

fn decode_line(line: &str) -> Result<WalRecord, String> {
    let (checksum, payload) = line
        .split_once(' ')
        .ok_or_else(|| "missing checksum".to_string())?;
    let expected =
        u32::from_str_radix(checksum, 16).map_err(|_| format!("bad checksum '{checksum}'"))?;
    let actual = crc32fast::hash(payload.as_bytes());
    if expected != actual {
        return Err(format!(
            "checksum mismatch: stored {expected:08x}, computed {actual:08x}"
        ));
    }
    serde_json::from_str(payload).map_err(|error| error.to_string())
}
