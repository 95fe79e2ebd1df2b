use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};

/// Truthy spellings accepted by [`StdCodec::parse_bool`].
const TRUES: &[&str] = &["t", "1", "true", "on", "enabled", "yes"];
/// Falsy spellings accepted by [`StdCodec::parse_bool`]. The empty string
/// counts as false so a defaulted read of a blank field is well defined.
const FALSES: &[&str] = &["f", "0", "false", "off", "disabled", "no", ""];

/// The reason a codec rejected a raw field value.
///
/// This only describes what the codec expected; callers fold it into a
/// [`ConvertError`](crate::ConvertError) together with the field index, the
/// raw value and the surrounding record.
#[derive(Clone, Debug)]
pub struct CodecError {
    expected: String,
}

impl CodecError {
    /// Create a new codec error from a description of the expected input.
    pub fn new<S: Into<String>>(expected: S) -> CodecError {
        CodecError { expected: expected.into() }
    }

    /// A description of what the codec expected the raw text to look like.
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected {}", self.expected)
    }
}

impl std::error::Error for CodecError {}

/// Converts between raw field text and typed values.
///
/// The tokenizer and the escaper never interpret field contents themselves;
/// every typed conversion goes through an implementation of this trait. The
/// `fmt_*`/`encode_*` methods must produce text free of separator, quote and
/// line-feed characters -- the escaper inserts their output verbatim. This is
/// a documented assumption, not something the writer enforces.
pub trait Codec: Send + Sync {
    /// Render a boolean.
    fn fmt_bool(&self, v: bool, out: &mut String);
    /// Render an integer.
    fn fmt_int(&self, v: i64, out: &mut String);
    /// Render a floating point number.
    fn fmt_float(&self, v: f64, out: &mut String);
    /// Render a single character.
    fn fmt_char(&self, v: char, out: &mut String);
    /// Render a timestamp.
    fn fmt_timestamp(&self, v: DateTime<Utc>, out: &mut String);
    /// Encode a byte array. The output is additionally wrapped in quote
    /// characters by the escaper.
    fn encode_bytes(&self, v: &[u8], out: &mut String);

    /// Parse a boolean.
    fn parse_bool(&self, s: &str) -> Result<bool, CodecError>;
    /// Parse an integer.
    fn parse_int(&self, s: &str) -> Result<i64, CodecError>;
    /// Parse a floating point number.
    fn parse_float(&self, s: &str) -> Result<f64, CodecError>;
    /// Parse a single character.
    fn parse_char(&self, s: &str) -> Result<char, CodecError>;
    /// Parse a timestamp.
    fn parse_timestamp(&self, s: &str) -> Result<DateTime<Utc>, CodecError>;
    /// Decode a byte array written by [`encode_bytes`](Codec::encode_bytes).
    fn decode_bytes(&self, s: &str) -> Result<Vec<u8>, CodecError>;
}

/// The default codec.
///
/// Numbers are formatted with `itoa`/`ryu`, booleans as `t`/`f` (with a
/// generous vocabulary accepted on parse), timestamps as epoch milliseconds
/// and byte arrays as standard base64.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdCodec;

impl Codec for StdCodec {
    fn fmt_bool(&self, v: bool, out: &mut String) {
        out.push(if v { 't' } else { 'f' });
    }

    fn fmt_int(&self, v: i64, out: &mut String) {
        let mut buf = itoa::Buffer::new();
        out.push_str(buf.format(v));
    }

    fn fmt_float(&self, v: f64, out: &mut String) {
        if v.is_finite() {
            let mut buf = ryu::Buffer::new();
            out.push_str(buf.format_finite(v));
        } else if v.is_nan() {
            out.push_str("NaN");
        } else if v > 0.0 {
            out.push_str("inf");
        } else {
            out.push_str("-inf");
        }
    }

    fn fmt_char(&self, v: char, out: &mut String) {
        out.push(v);
    }

    fn fmt_timestamp(&self, v: DateTime<Utc>, out: &mut String) {
        self.fmt_int(v.timestamp_millis(), out);
    }

    fn encode_bytes(&self, v: &[u8], out: &mut String) {
        STANDARD.encode_string(v, out);
    }

    fn parse_bool(&self, s: &str) -> Result<bool, CodecError> {
        let lower = s.to_ascii_lowercase();
        if TRUES.contains(&lower.as_str()) {
            Ok(true)
        } else if FALSES.contains(&lower.as_str()) {
            Ok(false)
        } else {
            Err(CodecError::new(format!(
                "one of {:?} or {:?}",
                TRUES, FALSES
            )))
        }
    }

    fn parse_int(&self, s: &str) -> Result<i64, CodecError> {
        s.parse::<i64>()
            .map_err(|_| CodecError::new("a decimal integer"))
    }

    fn parse_float(&self, s: &str) -> Result<f64, CodecError> {
        s.parse::<f64>()
            .map_err(|_| CodecError::new("a decimal floating point number"))
    }

    fn parse_char(&self, s: &str) -> Result<char, CodecError> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(CodecError::new("a string of length 1")),
        }
    }

    fn parse_timestamp(&self, s: &str) -> Result<DateTime<Utc>, CodecError> {
        let millis = self
            .parse_int(s)
            .map_err(|_| CodecError::new("milliseconds since the epoch"))?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| CodecError::new("milliseconds since the epoch"))
    }

    fn decode_bytes(&self, s: &str) -> Result<Vec<u8>, CodecError> {
        STANDARD
            .decode(s)
            .map_err(|_| CodecError::new("base64 encoded bytes"))
    }
}
