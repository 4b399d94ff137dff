//! # Unpack Pipeline
//!
//! Consumes the flat entry stream and rebuilds files and directories via
//! recursive descent with one-entry lookahead. The flat preorder encoding
//! has no end-of-directory marker; a frame expecting depth D knows a
//! directory's children are exhausted when the next entry's depth is
//! smaller than D, and leaves that entry in the reader's peek slot for the
//! ancestor frame that owns it.
//!
//! Directory context is explicit path composition: every create happens at
//! `base.join(name)` with `base` threaded through the recursion, so there
//! is no working-directory state to restore on error paths.

use crate::archive::{EntryKind, PackReader};
use crate::error::PackageError;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

/// Unpacks `archive` into `output_dir`, creating the directory if needed.
///
/// Prints the indented entry tree to stdout as it unpacks. The first error
/// aborts; entries already materialized stay on disk.
pub fn unpack_package(archive: &Path, output_dir: &Path) -> Result<(), PackageError> {
    debug!(archive = %archive.display(), output = %output_dir.display(), "unpacking package");
    fs::create_dir_all(output_dir).map_err(|e| PackageError::Io {
        source: e,
        path: output_dir.to_path_buf(),
    })?;

    let mut reader = PackReader::open(archive)?;
    rebuild(&mut reader, output_dir, 0)
}

/// Materializes every entry belonging to the frame at `depth` under `base`.
///
/// Returns cleanly when the stream ends (a valid terminal state at any
/// depth) or when the next entry's depth is smaller than `depth`, in which
/// case that entry stays peeked for the caller.
fn rebuild(reader: &mut PackReader, base: &Path, depth: usize) -> Result<(), PackageError> {
    loop {
        let Some(entry) = reader.peek()? else {
            return Ok(());
        };
        if (entry.depth as usize) < depth {
            // Belongs to an ancestor directory; hand control back.
            return Ok(());
        }
        reader.consume();

        let pad = "    ".repeat(entry.depth as usize);
        let target = base.join(&entry.name);
        match entry.kind {
            EntryKind::File => {
                println!("{pad}{}: {}", entry.name, entry.size);
                let mut file = File::create(&target).map_err(|e| PackageError::Io {
                    source: e,
                    path: target.clone(),
                })?;
                reader.copy_payload(entry.size as u64, &mut file, &target)?;
            }
            EntryKind::Directory => {
                println!("{pad}{}:", entry.name);
                fs::create_dir(&target).map_err(|e| PackageError::Io {
                    source: e,
                    path: target.clone(),
                })?;
                rebuild(reader, &target, depth + 1)?;
            }
        }
    }
}

/// Prints the archive's entry tree without writing anything to disk.
pub fn list_package(archive: &Path) -> Result<(), PackageError> {
    let mut reader = PackReader::open(archive)?;
    loop {
        let Some(entry) = reader.peek()? else {
            return Ok(());
        };
        reader.consume();

        let pad = "    ".repeat(entry.depth as usize);
        match entry.kind {
            EntryKind::File => {
                println!("{pad}{}: {}", entry.name, entry.size);
                reader.skip_payload(entry.size as u64)?;
            }
            EntryKind::Directory => println!("{pad}{}:", entry.name),
        }
    }
}
