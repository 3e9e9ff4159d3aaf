//! Error types for every layer of the pipeline.
//!
//! Only [`CaptureError`] and [`ConfigError`] are fatal. Everything raised while
//! handling a single frame is counted by the monitor and then dropped.

use std::io;

/// Why a frame could not be turned into header views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A header would extend past the captured bytes.
    #[error("frame truncated: {needed} bytes needed, {captured} captured")]
    Truncated { needed: usize, captured: usize },

    #[error("ether type {0:#06x} is not IPv4")]
    NotIpv4(u16),

    /// Header fields that contradict each other (bad version, ihl < 5, ...).
    #[error("malformed {layer} header")]
    Malformed { layer: &'static str },

    #[error("ip protocol {found} does not match the configured transport {expected}")]
    UnexpectedProtocol { expected: u8, found: u8 },
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Truncated { .. } => "Truncated",
            DecodeError::NotIpv4(_) => "NotIpv4",
            DecodeError::Malformed { .. } => "Malformed",
            DecodeError::UnexpectedProtocol { .. } => "UnexpectedProtocol",
        }
    }
}

/// Soft failures of the login correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CorrelateError {
    /// `USER`/`PASS` line with no CR LF inside the captured payload.
    #[error("{command} command has no CR LF terminator in the captured payload")]
    MalformedCommand { command: &'static str },

    #[error("table full ({capacity} entries), new key dropped")]
    TableFull { capacity: usize },
}

/// Storage append failed. The record that triggered it is not retried.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to append login record to {path}: {source}")]
    SinkWriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode login record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("filter {filter:?} does not mention the configured transport protocol {protocol}")]
    FilterProtocolMismatch { filter: String, protocol: String },

    #[error("port must be non-zero")]
    ZeroPort,
}

/// Errors at the libpcap boundary; these end the capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Pcap(#[from] pcap::Error),

    #[error("no capture device available")]
    NoDevice,

    /// The frame decoder assumes a 14-byte Ethernet header.
    #[error("link type {0} is not Ethernet (DLT_EN10MB)")]
    UnsupportedLinkType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_kind_names_variant() {
        assert_eq!(
            DecodeError::Truncated { needed: 34, captured: 10 }.kind(),
            "Truncated"
        );
        assert_eq!(DecodeError::NotIpv4(0x0806).kind(), "NotIpv4");
        assert_eq!(DecodeError::Malformed { layer: "ipv4" }.kind(), "Malformed");
        assert_eq!(
            DecodeError::UnexpectedProtocol { expected: 6, found: 17 }.kind(),
            "UnexpectedProtocol"
        );
    }

    #[test]
    fn test_truncated_display_mentions_lengths() {
        let err = DecodeError::Truncated { needed: 34, captured: 20 };
        assert_eq!(err.to_string(), "frame truncated: 34 bytes needed, 20 captured");
    }

    #[test]
    fn test_not_ipv4_display_is_hex() {
        assert_eq!(DecodeError::NotIpv4(0x86dd).to_string(), "ether type 0x86dd is not IPv4");
    }

    #[test]
    fn test_sink_error_keeps_io_source() {
        use std::error::Error;
        let err = SinkError::SinkWriteFailed {
            path: "/nope/record.csv".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/nope/record.csv"));
        assert!(err.source().is_some());
    }
}
