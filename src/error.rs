use std::error;
use std::fmt;
use std::io;
use std::result;

/// A type alias for `Result<T, csvstream::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when reading or writing CSV data.
///
/// All failures are surfaced immediately and are scoped to a single record:
/// one bad record does not poison subsequent reads, unless the stream itself
/// is left desynchronized (e.g. the source ended in the middle of a quoted
/// field).
#[derive(Debug)]
pub enum Error {
    /// An I/O error raised by the underlying source or sink.
    Io(io::Error),
    /// A field contained bytes that are not valid UTF-8.
    Utf8 {
        /// The record in which the bad field was found.
        record: u64,
        /// The index of the bad field within the record.
        field: usize,
    },
    /// A structurally malformed record: a pending run of quote characters
    /// whose parity cannot close the field where a terminator is required.
    InvalidRecord {
        /// The record that could not be parsed.
        record: u64,
        /// A description of the offending quote run.
        msg: String,
    },
    /// The source was exhausted while inside an unterminated quoted field.
    UnexpectedEof {
        /// The record that was being read when the source ended.
        record: u64,
        /// The number of characters read for the record so far.
        read: u64,
    },
    /// A record exceeded the configured per-record character budget.
    ///
    /// This is a resource exhaustion guard. It is not recoverable by
    /// retrying without raising the budget.
    RecordTooLong {
        /// The record that blew the budget.
        record: u64,
        /// The configured budget, in characters.
        limit: u64,
    },
    /// A field's raw text could not be converted to the requested type.
    Convert(ConvertError),
    /// API misuse, e.g. writing a record comment after fields have already
    /// been written for the current record.
    Usage(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ConvertError> for Error {
    fn from(err: ConvertError) -> Error {
        Error::Convert(err)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::Utf8 { record, field } => write!(
                f,
                "CSV parse error: record {} (field {}): invalid UTF-8",
                record, field
            ),
            Error::InvalidRecord { record, ref msg } => {
                write!(f, "CSV parse error: record {}: {}", record, msg)
            }
            Error::UnexpectedEof { record, read } => write!(
                f,
                "CSV parse error: record {}: end of stream while expecting \
                 more characters ({} read for record)",
                record, read
            ),
            Error::RecordTooLong { record, limit } => write!(
                f,
                "CSV parse error: record {}: exceeded {} characters",
                record, limit
            ),
            Error::Convert(ref err) => err.fmt(f),
            Error::Usage(ref msg) => write!(f, "CSV usage error: {}", msg),
        }
    }
}

/// An error describing a failed typed conversion of a single field.
///
/// Carries everything needed to diagnose the bad value: the field index, the
/// raw text, the requested type and the whole record re-serialized as a CSV
/// line.
#[derive(Clone, Debug)]
pub struct ConvertError {
    field: usize,
    value: String,
    ty: &'static str,
    expected: String,
    record: String,
}

impl ConvertError {
    pub(crate) fn new(
        field: usize,
        value: &str,
        ty: &'static str,
        expected: String,
        record: String,
    ) -> ConvertError {
        ConvertError {
            field: field,
            value: value.to_string(),
            ty: ty,
            expected: expected,
            record: record,
        }
    }

    /// The index of the field that failed to convert.
    pub fn field(&self) -> usize {
        self.field
    }

    /// The raw text of the field that failed to convert.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The name of the requested type.
    pub fn target_type(&self) -> &str {
        self.ty
    }

    /// The record that contained the bad field, re-serialized as CSV text.
    pub fn record(&self) -> &str {
        &self.record
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid value '{}' at field {} (as {}): {}. CSV record: {}",
            self.value, self.field, self.ty, self.expected, self.record
        )
    }
}

impl error::Error for ConvertError {}
