use std::path::PathBuf;

/// The primary error type for all operations in the `dirpak` crate.
///
/// The first error aborts the enclosing pack or unpack operation; there is
/// no partial-success mode and no resynchronization after a corrupt entry.
#[derive(Debug)]
pub enum PackageError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    Io { source: std::io::Error, path: PathBuf },

    /// The archive stream does not decode as a valid entry sequence:
    /// an unrecognized entry kind, a truncated header, name or payload,
    /// or a name that is not valid UTF-8.
    Format { detail: String },

    /// A name, payload or nesting depth does not fit the format's
    /// fixed-width fields. Checked before encoding, never by truncation.
    SizeLimit {
        /// Entry name the limit was hit on.
        subject: String,
        /// Which wire field overflowed ("name length", "payload size", "depth").
        field: &'static str,
        value: u64,
        max: u64,
    },
}

impl std::fmt::Display for PackageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageError::Io { source, path } => {
                write!(f, "I/O error on path '{}': {}", path.display(), source)
            }
            PackageError::Format { detail } => write!(f, "Invalid package data: {}", detail),
            PackageError::SizeLimit { subject, field, value, max } => write!(
                f,
                "Entry '{}' exceeds the {} limit: {} > {}",
                subject, field, value, max
            ),
        }
    }
}

impl std::error::Error for PackageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PackageError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        PackageError::Io { source: err, path: PathBuf::new() }
    }
}
