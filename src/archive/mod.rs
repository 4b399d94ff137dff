//! # Package Wire Format
//!
//! This module defines the structures and logic for the flat `.pkg` archive
//! format: the fixed-width entry header, the obfuscating stream writer used
//! by the pack pipeline, and the lookahead reader used by the unpack pipeline.
//!
//! An archive is one plaintext seed byte followed by a preorder sequence of
//! entries. Each entry is an 8-byte header, the raw name bytes and, for
//! files, the raw payload bytes. Every byte after the seed passes through
//! the keystream cipher; there is no index, no terminator and no padding.

use crate::cipher::Keystream;
use crate::error::PackageError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Size of the fixed-width portion of an entry record.
pub const HEADER_LEN: usize = 8;

// Chunk size for streaming payloads through the cipher.
const COPY_BUF_LEN: usize = 64 * 1024;

/// Whether an entry records a regular file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    File = 1,
    Directory = 2,
}

impl TryFrom<u8> for EntryKind {
    type Error = PackageError;

    fn try_from(value: u8) -> Result<Self, PackageError> {
        match value {
            1 => Ok(EntryKind::File),
            2 => Ok(EntryKind::Directory),
            other => Err(PackageError::Format {
                detail: format!("unrecognized entry kind {}", other),
            }),
        }
    }
}

/// The fixed-width portion of one archive entry.
///
/// Fields are stored little-endian in the order kind, depth, name length,
/// payload size. The name bytes follow immediately, then the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: EntryKind,
    pub depth: u8,
    pub name_len: u16,
    pub size: u32,
}

impl EntryHeader {
    /// Serializes the header into its 8-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.kind as u8;
        out[1] = self.depth;
        out[2..4].copy_from_slice(&self.name_len.to_le_bytes());
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    /// Parses an 8-byte wire record, rejecting unknown entry kinds.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, PackageError> {
        Ok(Self {
            kind: EntryKind::try_from(bytes[0])?,
            depth: bytes[1],
            name_len: u16::from_le_bytes([bytes[2], bytes[3]]),
            size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// One decoded entry: header fields plus the name that follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub depth: u8,
    pub size: u32,
    pub name: String,
}

/// An obfuscating writer that produces a `.pkg` archive.
///
/// Draws a random seed on creation, stores it in plaintext as byte 0 and
/// masks everything written afterwards with the keystream derived from it.
pub struct PackWriter {
    writer: BufWriter<File>,
    cipher: Keystream,
    path: PathBuf,
}

impl PackWriter {
    /// Creates (or truncates) the archive file and writes the seed byte.
    pub fn create(path: &Path) -> Result<Self, PackageError> {
        let file = File::create(path).map_err(|e| PackageError::Io {
            source: e,
            path: path.to_path_buf(),
        })?;
        let mut writer = BufWriter::new(file);

        let seed = (OsRng.next_u32() & 0xFF) as u8;
        writer.write_all(&[seed]).map_err(|e| PackageError::Io {
            source: e,
            path: path.to_path_buf(),
        })?;

        Ok(Self {
            writer,
            cipher: Keystream::new(seed),
            path: path.to_path_buf(),
        })
    }

    /// Writes one entry header followed by its name bytes.
    ///
    /// The name length, payload size and depth are validated against the
    /// format's field widths before anything reaches the stream, so an
    /// oversized entry never leaves a half-written record behind.
    pub fn write_entry(
        &mut self,
        kind: EntryKind,
        depth: usize,
        name: &str,
        size: u64,
    ) -> Result<(), PackageError> {
        if depth > u8::MAX as usize {
            return Err(PackageError::SizeLimit {
                subject: name.to_string(),
                field: "depth",
                value: depth as u64,
                max: u8::MAX as u64,
            });
        }
        if name.len() > u16::MAX as usize {
            return Err(PackageError::SizeLimit {
                subject: name.to_string(),
                field: "name length",
                value: name.len() as u64,
                max: u16::MAX as u64,
            });
        }
        if size > u32::MAX as u64 {
            return Err(PackageError::SizeLimit {
                subject: name.to_string(),
                field: "payload size",
                value: size,
                max: u32::MAX as u64,
            });
        }

        let header = EntryHeader {
            kind,
            depth: depth as u8,
            name_len: name.len() as u16,
            size: size as u32,
        };
        self.write_obfuscated(&header.encode())?;
        self.write_obfuscated(name.as_bytes())
    }

    /// Streams exactly `len` payload bytes from `input` into the archive.
    ///
    /// `origin` is the file being packed, used for error context. A source
    /// that runs dry early (shrank under us) aborts the pack.
    pub fn write_payload<R: Read>(
        &mut self,
        input: &mut R,
        len: u64,
        origin: &Path,
    ) -> Result<(), PackageError> {
        let mut buf = vec![0u8; COPY_BUF_LEN.min(len as usize).max(1)];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let got = match input.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(PackageError::Format {
                        detail: format!(
                            "'{}' shrank while packing: {} of {} payload bytes unread",
                            origin.display(),
                            remaining,
                            len
                        ),
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PackageError::Io { source: e, path: origin.to_path_buf() })
                }
            };
            self.cipher.apply(&mut buf[..got]);
            self.writer.write_all(&buf[..got]).map_err(|e| PackageError::Io {
                source: e,
                path: self.path.clone(),
            })?;
            remaining -= got as u64;
        }
        Ok(())
    }

    /// Flushes buffered output and closes the archive.
    pub fn finish(mut self) -> Result<(), PackageError> {
        self.writer.flush().map_err(|e| PackageError::Io {
            source: e,
            path: self.path.clone(),
        })
    }

    fn write_obfuscated(&mut self, bytes: &[u8]) -> Result<(), PackageError> {
        let mut masked = bytes.to_vec();
        self.cipher.apply(&mut masked);
        self.writer.write_all(&masked).map_err(|e| PackageError::Io {
            source: e,
            path: self.path.clone(),
        })
    }
}

/// A decoding reader over a `.pkg` archive with one-entry lookahead.
///
/// [`PackReader::peek`] decodes the next header and name into an internal
/// slot without committing it; [`PackReader::consume`] commits the slot.
/// The rebuilder uses this to notice an entry that belongs to an ancestor
/// directory and leave it for the caller's recursion frame. Buffering the
/// decoded entry keeps the stream position and the cipher counter in step,
/// instead of rewinding the two state machines separately.
#[derive(Debug)]
pub struct PackReader {
    reader: BufReader<File>,
    cipher: Keystream,
    path: PathBuf,
    pending: Option<Entry>,
}

impl PackReader {
    /// Opens an archive and reads the plaintext seed byte.
    pub fn open(path: &Path) -> Result<Self, PackageError> {
        let file = File::open(path).map_err(|e| PackageError::Io {
            source: e,
            path: path.to_path_buf(),
        })?;
        let mut reader = BufReader::new(file);

        let mut seed = [0u8; 1];
        reader.read_exact(&mut seed).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                PackageError::Format {
                    detail: format!("'{}' is empty, missing the seed byte", path.display()),
                }
            } else {
                PackageError::Io { source: e, path: path.to_path_buf() }
            }
        })?;

        Ok(Self {
            reader,
            cipher: Keystream::new(seed[0]),
            path: path.to_path_buf(),
            pending: None,
        })
    }

    /// Decodes the next entry header and name without consuming it.
    ///
    /// Returns `Ok(None)` on a clean end of stream, which is a valid
    /// terminal state at any depth. Repeated calls return the identical
    /// entry until [`PackReader::consume`] commits it.
    pub fn peek(&mut self) -> Result<Option<Entry>, PackageError> {
        if self.pending.is_none() {
            self.pending = self.read_entry()?;
        }
        Ok(self.pending.clone())
    }

    /// Commits the entry returned by the last [`PackReader::peek`].
    ///
    /// For a file entry the payload must be drained with
    /// [`PackReader::copy_payload`] or [`PackReader::skip_payload`] before
    /// the next peek, since payload bytes follow the name on the wire.
    pub fn consume(&mut self) {
        self.pending = None;
    }

    /// Streams exactly `len` obfuscation-reversed payload bytes into `out`.
    ///
    /// `dest` names the write target for error context. Running out of
    /// archive bytes mid-payload is a format error carrying the expected
    /// and missing byte counts.
    pub fn copy_payload<W: Write>(
        &mut self,
        len: u64,
        out: &mut W,
        dest: &Path,
    ) -> Result<(), PackageError> {
        let mut buf = vec![0u8; COPY_BUF_LEN.min(len as usize).max(1)];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let got = match self.reader.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(PackageError::Format {
                        detail: format!(
                            "truncated payload in '{}': expected {} bytes, {} missing",
                            self.path.display(),
                            len,
                            remaining
                        ),
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PackageError::Io { source: e, path: self.path.clone() })
                }
            };
            self.cipher.apply(&mut buf[..got]);
            out.write_all(&buf[..got]).map_err(|e| PackageError::Io {
                source: e,
                path: dest.to_path_buf(),
            })?;
            remaining -= got as u64;
        }
        Ok(())
    }

    /// Drains and discards `len` payload bytes, keeping the cipher in step.
    pub fn skip_payload(&mut self, len: u64) -> Result<(), PackageError> {
        let archive = self.path.clone();
        self.copy_payload(len, &mut io::sink(), &archive)
    }

    fn read_entry(&mut self) -> Result<Option<Entry>, PackageError> {
        let mut header_bytes = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            match self.reader.read(&mut header_bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PackageError::Io { source: e, path: self.path.clone() })
                }
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < HEADER_LEN {
            return Err(PackageError::Format {
                detail: format!(
                    "truncated entry header in '{}': expected {} bytes, got {}",
                    self.path.display(),
                    HEADER_LEN,
                    filled
                ),
            });
        }

        self.cipher.apply(&mut header_bytes);
        let header = EntryHeader::decode(&header_bytes)?;

        let mut name_bytes = vec![0u8; header.name_len as usize];
        self.reader.read_exact(&mut name_bytes).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                PackageError::Format {
                    detail: format!(
                        "truncated entry name in '{}': expected {} bytes",
                        self.path.display(),
                        header.name_len
                    ),
                }
            } else {
                PackageError::Io { source: e, path: self.path.clone() }
            }
        })?;
        self.cipher.apply(&mut name_bytes);

        let name = String::from_utf8(name_bytes).map_err(|_| PackageError::Format {
            detail: "entry name is not valid UTF-8".to_string(),
        })?;

        Ok(Some(Entry {
            kind: header.kind,
            depth: header.depth,
            size: header.size,
            name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn header_round_trips_through_wire_form() {
        let header = EntryHeader {
            kind: EntryKind::File,
            depth: 7,
            name_len: 300,
            size: 0xDEAD_BEEF,
        };
        let decoded = EntryHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_rejects_unknown_kind() {
        let mut bytes = EntryHeader {
            kind: EntryKind::Directory,
            depth: 0,
            name_len: 1,
            size: 0,
        }
        .encode();
        bytes[0] = 9;
        let err = EntryHeader::decode(&bytes).unwrap_err();
        assert!(matches!(err, PackageError::Format { .. }), "got {err:?}");
    }

    #[test]
    fn writer_rejects_oversized_fields_before_writing() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("limits.pkg");
        let mut writer = PackWriter::create(&archive).unwrap();

        let long_name = "x".repeat(u16::MAX as usize + 1);
        let err = writer.write_entry(EntryKind::File, 0, &long_name, 0).unwrap_err();
        assert!(matches!(err, PackageError::SizeLimit { field: "name length", .. }));

        let err = writer
            .write_entry(EntryKind::File, 0, "big.bin", u32::MAX as u64 + 1)
            .unwrap_err();
        assert!(matches!(err, PackageError::SizeLimit { field: "payload size", .. }));

        let err = writer.write_entry(EntryKind::Directory, 256, "deep", 0).unwrap_err();
        assert!(matches!(err, PackageError::SizeLimit { field: "depth", .. }));

        writer.finish().unwrap();
        // Only the seed byte made it out.
        assert_eq!(fs::read(&archive).unwrap().len(), 1);
    }

    #[test]
    fn write_then_read_back_entries() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("cycle.pkg");

        let mut writer = PackWriter::create(&archive).unwrap();
        writer.write_entry(EntryKind::Directory, 0, "top", 0).unwrap();
        writer.write_entry(EntryKind::File, 1, "a.txt", 2).unwrap();
        writer.write_payload(&mut &b"hi"[..], 2, Path::new("a.txt")).unwrap();
        writer.finish().unwrap();

        let mut reader = PackReader::open(&archive).unwrap();

        let first = reader.peek().unwrap().unwrap();
        assert_eq!(first.kind, EntryKind::Directory);
        assert_eq!(first.depth, 0);
        assert_eq!(first.name, "top");
        assert_eq!(first.size, 0);

        // Lookahead is stable until committed.
        let again = reader.peek().unwrap().unwrap();
        assert_eq!(again, first);
        reader.consume();

        let second = reader.peek().unwrap().unwrap();
        assert_eq!(second.kind, EntryKind::File);
        assert_eq!(second.depth, 1);
        assert_eq!(second.name, "a.txt");
        assert_eq!(second.size, 2);
        reader.consume();

        let mut payload = Vec::new();
        reader.copy_payload(2, &mut payload, Path::new("a.txt")).unwrap();
        assert_eq!(payload, b"hi");

        assert!(reader.peek().unwrap().is_none());
    }

    #[test]
    fn seed_is_plaintext_and_body_is_masked() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("seed.pkg");

        let mut writer = PackWriter::create(&archive).unwrap();
        writer.write_entry(EntryKind::File, 0, "n", 0).unwrap();
        writer.finish().unwrap();

        let raw = fs::read(&archive).unwrap();
        assert_eq!(raw.len(), 1 + HEADER_LEN + 1);

        // Unmasking the body with the keystream seeded from byte 0 must
        // reproduce the record that was written.
        let mut body = raw[1..].to_vec();
        Keystream::new(raw[0]).apply(&mut body);
        let header = EntryHeader::decode(&body[..HEADER_LEN].try_into().unwrap()).unwrap();
        assert_eq!(header.kind, EntryKind::File);
        assert_eq!(header.depth, 0);
        assert_eq!(header.name_len, 1);
        assert_eq!(header.size, 0);
        assert_eq!(&body[HEADER_LEN..], b"n");
    }

    #[test]
    fn truncated_header_is_a_format_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("short.pkg");
        // Seed plus half a header.
        fs::write(&archive, [0x42, 1, 0, 3]).unwrap();

        let mut reader = PackReader::open(&archive).unwrap();
        let err = reader.peek().unwrap_err();
        assert!(matches!(err, PackageError::Format { .. }), "got {err:?}");
    }

    #[test]
    fn empty_archive_file_is_rejected() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("empty.pkg");
        fs::write(&archive, []).unwrap();
        let err = PackReader::open(&archive).unwrap_err();
        assert!(matches!(err, PackageError::Format { .. }), "got {err:?}");
    }

    #[test]
    fn seed_only_archive_is_a_valid_empty_stream() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("bare.pkg");
        fs::write(&archive, [0x99]).unwrap();
        let mut reader = PackReader::open(&archive).unwrap();
        assert!(reader.peek().unwrap().is_none());
    }
}
