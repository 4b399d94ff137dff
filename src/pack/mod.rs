//! # Pack Pipeline
//!
//! Walks the input paths and emits the flat, depth-tagged preorder entry
//! sequence. Each top-level argument becomes a depth-0 entry named by the
//! literal argument string; entries below a directory argument carry their
//! bare file names at depth = nesting level. Sibling order is whatever the
//! directory walk yields.

use crate::archive::{EntryKind, PackWriter};
use crate::error::PackageError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Creates a package at `output` from the given files and directories.
///
/// Prints the indented entry tree to stdout as it packs. Top-level
/// arguments that are neither a regular file nor a directory are skipped;
/// any filesystem error below that aborts the whole pack.
pub fn create_package(output: &Path, inputs: &[PathBuf]) -> Result<(), PackageError> {
    debug!(output = %output.display(), inputs = inputs.len(), "creating package");
    let mut writer = PackWriter::create(output)?;

    for path in inputs {
        if path.is_file() {
            let name = arg_name(path)?;
            pack_file(&mut writer, path, &name, 0)?;
        } else if path.is_dir() {
            pack_tree(&mut writer, path)?;
        } else {
            warn!(path = %path.display(), "skipping: not a regular file or directory");
        }
    }

    writer.finish()?;
    debug!(output = %output.display(), "package created");
    Ok(())
}

/// Emits one directory argument and everything beneath it, in preorder.
fn pack_tree(writer: &mut PackWriter, root: &Path) -> Result<(), PackageError> {
    let root_name = arg_name(root)?;

    // follow_links matches the stat-based type checks used at the top level:
    // a symlink to a file packs the target's content.
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
            PackageError::Io { source, path }
        })?;

        let depth = entry.depth();
        let name = if depth == 0 {
            root_name.clone()
        } else {
            entry
                .file_name()
                .to_str()
                .ok_or_else(|| PackageError::Format {
                    detail: format!("'{}' has a non-UTF-8 name", entry.path().display()),
                })?
                .to_string()
        };

        if entry.file_type().is_dir() {
            writer.write_entry(EntryKind::Directory, depth, &name, 0)?;
            println!("{}{}:", "    ".repeat(depth), name);
        } else if entry.file_type().is_file() {
            pack_file(writer, entry.path(), &name, depth)?;
        } else {
            // Sockets, fifos and the like, same as at the top level.
            warn!(path = %entry.path().display(), "skipping: not a regular file or directory");
        }
    }
    Ok(())
}

/// Emits one file entry: header, name, then the file content as payload.
fn pack_file(
    writer: &mut PackWriter,
    path: &Path,
    name: &str,
    depth: usize,
) -> Result<(), PackageError> {
    let metadata = std::fs::metadata(path).map_err(|e| PackageError::Io {
        source: e,
        path: path.to_path_buf(),
    })?;
    let size = metadata.len();

    writer.write_entry(EntryKind::File, depth, name, size)?;

    let mut file = File::open(path).map_err(|e| PackageError::Io {
        source: e,
        path: path.to_path_buf(),
    })?;
    writer.write_payload(&mut file, size, path)?;

    println!("{}{}: {}", "    ".repeat(depth), name, size);
    Ok(())
}

/// The literal argument string, as stored in depth-0 entry names.
fn arg_name(path: &Path) -> Result<String, PackageError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| PackageError::Format {
            detail: format!("'{}' is not a valid UTF-8 path", path.display()),
        })
}
