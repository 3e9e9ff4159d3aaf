//! The per-frame pipeline: decode → account → correlate → sink.
//!
//! [`Monitor`] owns all state that outlives a frame. It is driven by one
//! thread, one frame at a time.

use chrono::{DateTime, Utc};

use crate::config::{Config, TransportProtocol, TABLE_CAPACITY};
use crate::db::EventSink;
use crate::error::{CorrelateError, DecodeError};
use crate::login::{LoginCorrelator, Outcome};
use crate::models::{LoginRecord, MinuteReport};
use crate::parser;
use crate::traffic::{FlowAccountant, MinuteMeter};

/// Counters for every way a frame can be dropped or partially handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames: u64,
    pub truncated: u64,
    pub not_ipv4: u64,
    pub malformed: u64,
    pub unexpected_protocol: u64,
    pub malformed_commands: u64,
    pub session_table_full: u64,
    pub logins: u64,
    pub sink_failures: u64,
    pub reports: u64,
}

/// What one frame produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub report: Option<MinuteReport>,
    pub login: Option<LoginRecord>,
}

pub struct Monitor<S> {
    protocol: TransportProtocol,
    flows: FlowAccountant,
    meter: MinuteMeter,
    logins: LoginCorrelator,
    sink: S,
    stats: MonitorStats,
}

impl<S: EventSink> Monitor<S> {
    pub fn new(config: &Config, sink: S) -> Self {
        Self {
            protocol: config.protocol,
            flows: FlowAccountant::new(config.watch_addr, TABLE_CAPACITY),
            meter: MinuteMeter::new(config.report_addr),
            logins: LoginCorrelator::new(TABLE_CAPACITY),
            sink,
            stats: MonitorStats::default(),
        }
    }

    /// Runs one captured frame through the pipeline.
    ///
    /// A decode error means the frame was dropped before any state changed.
    /// Correlation and sink failures are logged and counted, never returned.
    pub fn process_frame(
        &mut self,
        timestamp: DateTime<Utc>,
        caplen: usize,
        data: &[u8],
    ) -> Result<FrameOutput, DecodeError> {
        self.stats.frames += 1;
        let frame = match parser::parse_frame(data, caplen, self.protocol) {
            Ok(frame) => frame,
            Err(err) => {
                self.count_decode_error(&err);
                tracing::trace!(kind = err.kind(), "dropped frame: {}", err);
                return Err(err);
            }
        };

        let network = frame.network();
        let direction = self.flows.record(network);
        let report = self.meter.tick(timestamp, network);
        if report.is_some() {
            self.stats.reports += 1;
        }

        let login = match self.logins.observe(
            direction,
            network.source(),
            network.destination(),
            frame.payload(),
            timestamp,
        ) {
            Ok(Outcome::Completed(record)) => {
                self.stats.logins += 1;
                if let Err(err) = self.sink.record(&record) {
                    self.stats.sink_failures += 1;
                    tracing::warn!("{}", err);
                }
                Some(record)
            }
            Ok(_) => None,
            Err(err @ CorrelateError::MalformedCommand { .. }) => {
                self.stats.malformed_commands += 1;
                tracing::debug!(server = %network.destination(), "{}", err);
                None
            }
            Err(err @ CorrelateError::TableFull { .. }) => {
                self.stats.session_table_full += 1;
                tracing::debug!(server = %network.destination(), "session {}", err);
                None
            }
        };

        Ok(FrameOutput { report, login })
    }

    fn count_decode_error(&mut self, err: &DecodeError) {
        let counter = match err {
            DecodeError::Truncated { .. } => &mut self.stats.truncated,
            DecodeError::NotIpv4(_) => &mut self.stats.not_ipv4,
            DecodeError::Malformed { .. } => &mut self.stats.malformed,
            DecodeError::UnexpectedProtocol { .. } => &mut self.stats.unexpected_protocol,
        };
        *counter += 1;
    }

    pub fn flows(&self) -> &FlowAccountant {
        &self.flows
    }

    pub fn meter(&self) -> &MinuteMeter {
        &self.meter
    }

    pub fn logins(&self) -> &LoginCorrelator {
        &self.logins
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use chrono::TimeZone;
    use etherparse::PacketBuilder;
    use std::net::Ipv4Addr;

    const WATCH: [u8; 4] = [192, 168, 1, 108];
    const SERVER: [u8; 4] = [10, 0, 0, 21];

    struct FailingSink;

    impl EventSink for FailingSink {
        fn record(&mut self, _: &LoginRecord) -> Result<(), SinkError> {
            Err(SinkError::SinkWriteFailed {
                path: "record.csv".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }
    }

    fn frame(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4(src, dst, 64)
            .tcp(50000, 21, 1, 1024);
        let mut buf = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut buf, payload).unwrap();
        buf
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_sink_failure_is_counted_and_session_discarded() {
        let config = Config::new(Ipv4Addr::from(WATCH));
        let mut monitor = Monitor::new(&config, FailingSink);
        for (src, dst, payload) in [
            (WATCH, SERVER, &b"USER alice\r\n"[..]),
            (WATCH, SERVER, &b"PASS secret\r\n"[..]),
            (SERVER, WATCH, &b"230\r\n"[..]),
        ] {
            let buf = frame(src, dst, payload);
            monitor.process_frame(at(0), buf.len(), &buf).unwrap();
        }

        assert_eq!(monitor.stats().sink_failures, 1);
        assert_eq!(monitor.stats().logins, 1);

        // a repeated reply must not emit the same login twice
        let buf = frame(SERVER, WATCH, b"230\r\n");
        let out = monitor.process_frame(at(1), buf.len(), &buf).unwrap();
        assert!(out.login.is_none());
        assert_eq!(monitor.stats().sink_failures, 1);
    }

    #[test]
    fn test_decode_errors_are_counted_by_kind() {
        let config = Config::new(Ipv4Addr::from(WATCH));
        let mut monitor = Monitor::new(&config, FailingSink);
        assert!(monitor.process_frame(at(0), 10, &[0u8; 10]).is_err());

        let mut arp = frame(WATCH, SERVER, b"");
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert!(monitor.process_frame(at(0), arp.len(), &arp).is_err());

        let stats = monitor.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.truncated, 1);
        assert_eq!(stats.not_ipv4, 1);
        assert_eq!(monitor.flows().received_peers() + monitor.flows().sent_peers(), 0);
    }

    #[test]
    fn test_unterminated_user_is_counted() {
        let config = Config::new(Ipv4Addr::from(WATCH));
        let mut monitor = Monitor::new(&config, FailingSink);
        let buf = frame(WATCH, SERVER, b"USER alice");
        monitor.process_frame(at(0), buf.len(), &buf).unwrap();
        assert_eq!(monitor.stats().malformed_commands, 1);
        assert_eq!(monitor.logins().session_count(), 0);
    }
}
