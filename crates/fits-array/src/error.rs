use std::fmt;

/// All errors that can occur while constructing, indexing, or persisting
/// data entities.
#[derive(Debug)]
pub enum Error {
    /// Invalid construction parameter (unsupported datatype, zero binning
    /// factor, non-positive dimension).
    Config(String),
    /// Illegal coordinate usage under the FITS convention (zero index,
    /// malformed slice, too many axes).
    Convention(String),
    /// Region extraction or element access outside the data extents.
    Range(String),
    /// An operation requiring data was attempted on an entity with no buffer.
    Data(String),
    /// Failure loading data from a file.
    Load { path: String, reason: String },
    /// Failure saving data to a file.
    Save { path: String, reason: String },
    /// Mismatched collection lengths in a stack operation.
    LengthMismatch { expected: usize, actual: usize },
    /// An I/O error from the standard library.
    Io(std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Error::Convention(msg) => write!(f, "illegal coordinate: {msg}"),
            Error::Range(msg) => write!(f, "out of range: {msg}"),
            Error::Data(msg) => write!(f, "no data: {msg}"),
            Error::Load { path, reason } => write!(f, "error loading {path}: {reason}"),
            Error::Save { path, reason } => write!(f, "error saving {path}: {reason}"),
            Error::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch: expected {expected}, got {actual}")
            }
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config() {
        let e = Error::Config(String::from("binning factor of 0"));
        assert_eq!(e.to_string(), "invalid configuration: binning factor of 0");
    }

    #[test]
    fn display_convention() {
        let e = Error::Convention(String::from("index 0 is illegal"));
        assert_eq!(e.to_string(), "illegal coordinate: index 0 is illegal");
    }

    #[test]
    fn display_range() {
        let e = Error::Range(String::from("region exceeds extents"));
        assert_eq!(e.to_string(), "out of range: region exceeds extents");
    }

    #[test]
    fn display_data() {
        let e = Error::Data(String::from("image has no data"));
        assert_eq!(e.to_string(), "no data: image has no data");
    }

    #[test]
    fn display_load() {
        let e = Error::Load {
            path: String::from("missing.fits"),
            reason: String::from("file not found"),
        };
        assert_eq!(e.to_string(), "error loading missing.fits: file not found");
    }

    #[test]
    fn display_save() {
        let e = Error::Save {
            path: String::from("out.fits"),
            reason: String::from("file exists"),
        };
        assert_eq!(e.to_string(), "error saving out.fits: file exists");
    }

    #[test]
    fn display_length_mismatch() {
        let e = Error::LengthMismatch {
            expected: 3,
            actual: 5,
        };
        assert_eq!(e.to_string(), "length mismatch: expected 3, got 5");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = Error::Io(io_err);
        assert_eq!(e.to_string(), "I/O error: file not found");
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::other("oops");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn result_type_alias() {
        let ok: Result<u32> = Ok(42);
        assert!(ok.is_ok());

        let err: Result<u32> = Err(Error::Data(String::from("empty")));
        assert!(err.is_err());
    }

    #[test]
    fn debug_formatting() {
        let e = Error::LengthMismatch {
            expected: 1,
            actual: 2,
        };
        let debug = format!("{e:?}");
        assert!(debug.contains("LengthMismatch"));
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        let e = Error::Config(String::from("x"));
        assert!(e.source().is_none());

        let io_err = std::io::Error::other("inner");
        let e = Error::Io(io_err);
        assert!(e.source().is_some());
    }
}
