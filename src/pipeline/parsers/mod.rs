pub mod normalize;
pub mod parsed_data;
pub mod biotronik;
pub mod abbott;
pub mod boston;
pub mod pdf;

pub use parsed_data::*;
pub use biotronik::BiotronikParser;
pub use abbott::AbbottParser;
pub use boston::BostonParser;
pub use pdf::{inspect_pdf, DeferredExtraction};

use thiserror::Error;

use crate::models::enums::DeviceFormat;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// `offset` is a byte offset for XML and PDF, a 1-based line for LOG and BNK.
    #[error("Malformed {format} input at {offset}: {reason}")]
    MalformedInput {
        format: DeviceFormat,
        offset: u64,
        reason: String,
    },
}

impl ParseError {
    pub(crate) fn malformed(format: DeviceFormat, offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            format,
            offset,
            reason: reason.into(),
        }
    }
}

/// A vendor export reader. Implementations are stateless and read the
/// whole input in one pass.
pub trait DeviceParser {
    fn format(&self) -> DeviceFormat;

    fn parse(&self, bytes: &[u8]) -> Result<ParsedData, ParseError>;
}

/// What a parse produced: a populated record, or a container whose
/// content extraction is not performed.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed(ParsedData),
    Deferred(DeferredExtraction),
}

/// Run the parser for `format` over the full upload.
pub fn parse_report(format: DeviceFormat, bytes: &[u8]) -> Result<ParseOutcome, ParseError> {
    let parser: &dyn DeviceParser = match format {
        DeviceFormat::Xml => &BiotronikParser,
        DeviceFormat::Log => &AbbottParser,
        DeviceFormat::Bnk => &BostonParser,
        DeviceFormat::Pdf => return inspect_pdf(bytes).map(ParseOutcome::Deferred),
        DeviceFormat::Unsupported => {
            return Err(ParseError::UnsupportedFormat(format.as_str().into()))
        }
    };

    let data = parser.parse(bytes)?;
    tracing::debug!(
        format = %parser.format(),
        serial = data.serial_number.as_deref().unwrap_or("-"),
        "Parsed device report"
    );
    Ok(ParseOutcome::Parsed(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_rejected() {
        let err = parse_report(DeviceFormat::Unsupported, b"anything").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn dispatch_reaches_log_parser() {
        let input = "302\x1cLow Rate\x1c1000 ms\n";
        match parse_report(DeviceFormat::Log, input.as_bytes()).unwrap() {
            ParseOutcome::Parsed(data) => {
                assert_eq!(data.brady.low_rate_bpm.as_deref(), Some("60"));
                assert_eq!(data.manufacturer.as_deref(), Some("Abbott"));
            }
            ParseOutcome::Deferred(_) => panic!("LOG input must parse"),
        }
    }

    #[test]
    fn malformed_error_names_format_and_offset() {
        let err = ParseError::malformed(DeviceFormat::Bnk, 1, "missing SAVE DATE header");
        assert_eq!(
            err.to_string(),
            "Malformed bnk input at 1: missing SAVE DATE header"
        );
    }
}
