//! Per-peer byte accounting for the watched address, and the per-minute
//! throughput report.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Local, Timelike, Utc};
use crate::models::{Direction, MinuteReport};
use crate::parser::NetworkHeader;
use crate::table::BoundedTable;

/// Two bounded peer → bytes tables, one per direction.
#[derive(Debug, Clone)]
pub struct FlowAccountant {
    watch_addr: Ipv4Addr,
    /// Bytes received by the watched address, keyed by sender.
    received: BoundedTable<Ipv4Addr, u64>,
    /// Bytes sent by the watched address, keyed by receiver.
    sent: BoundedTable<Ipv4Addr, u64>,
}

impl FlowAccountant {
    pub fn new(watch_addr: Ipv4Addr, capacity: usize) -> Self {
        Self {
            watch_addr,
            received: BoundedTable::with_capacity(capacity),
            sent: BoundedTable::with_capacity(capacity),
        }
    }

    pub fn direction(&self, source: Ipv4Addr, destination: Ipv4Addr) -> Direction {
        if destination == self.watch_addr {
            Direction::Inbound
        } else if source == self.watch_addr {
            Direction::Outbound
        } else {
            Direction::Unrelated
        }
    }

    pub fn record(&mut self, header: &NetworkHeader<'_>) -> Direction {
        self.record_datagram(header.source(), header.destination(), header.total_len())
    }

    /// Adds `total_len` to the peer's entry in the table for this direction.
    /// A new peer arriving at a full table is dropped; the table counts it.
    pub fn record_datagram(
        &mut self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        total_len: u16,
    ) -> Direction {
        let direction = self.direction(source, destination);
        let (table, peer) = match direction {
            Direction::Inbound => (&mut self.received, source),
            Direction::Outbound => (&mut self.sent, destination),
            Direction::Unrelated => return direction,
        };

        match table.get_or_insert_with(peer, || 0) {
            Ok(bytes) => *bytes += u64::from(total_len),
            Err(err) => {
                tracing::debug!(%peer, ?direction, "flow table: {}", err);
            }
        }
        direction
    }

    pub fn received_from(&self, peer: Ipv4Addr) -> Option<u64> {
        self.received.get(&peer).copied()
    }

    pub fn sent_to(&self, peer: Ipv4Addr) -> Option<u64> {
        self.sent.get(&peer).copied()
    }

    pub fn received_peers(&self) -> usize {
        self.received.len()
    }

    pub fn sent_peers(&self) -> usize {
        self.sent.len()
    }

    /// Peers refused because a table was full, over both tables.
    pub fn dropped(&self) -> u64 {
        self.received.dropped() + self.sent.dropped()
    }

    pub fn summary(&self) -> FlowSummary {
        FlowSummary {
            watch_addr: self.watch_addr,
            received: self.received.iter().map(|(a, b)| (*a, *b)).collect(),
            sent: self.sent.iter().map(|(a, b)| (*a, *b)).collect(),
            received_dropped: self.received.dropped(),
            sent_dropped: self.sent.dropped(),
        }
    }
}

/// Snapshot of both flow tables, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSummary {
    pub watch_addr: Ipv4Addr,
    pub received: Vec<(Ipv4Addr, u64)>,
    pub sent: Vec<(Ipv4Addr, u64)>,
    pub received_dropped: u64,
    pub sent_dropped: u64,
}

impl fmt::Display for FlowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (addr, bytes)) in self.received.iter().enumerate() {
            writeln!(f, "{}----{}--REC---{}", i, addr, bytes)?;
        }
        writeln!(f)?;
        for (i, (addr, bytes)) in self.sent.iter().enumerate() {
            writeln!(f, "{}----{}--SEN---{}", i, addr, bytes)?;
        }
        if self.received_dropped + self.sent_dropped > 0 {
            writeln!(
                f,
                "dropped peers: {} received, {} sent",
                self.received_dropped, self.sent_dropped
            )?;
        }
        Ok(())
    }
}

/// Received/sent totals of one address, reported when the minute changes.
#[derive(Debug, Clone)]
pub struct MinuteMeter {
    report_addr: Ipv4Addr,
    /// Minute index (seconds / 60) and local start time of the open minute.
    current: Option<(i64, DateTime<Local>)>,
    received: u64,
    sent: u64,
}

impl MinuteMeter {
    pub fn new(report_addr: Ipv4Addr) -> Self {
        Self {
            report_addr,
            current: None,
            received: 0,
            sent: 0,
        }
    }

    pub fn tick(&mut self, timestamp: DateTime<Utc>, header: &NetworkHeader<'_>) -> Option<MinuteReport> {
        self.tick_datagram(timestamp, header.source(), header.destination(), header.total_len())
    }

    /// Closes the open minute if `timestamp` falls in a different one, then
    /// accumulates this datagram into the (possibly new) open minute.
    ///
    /// The first call only opens a minute. A returned report covers exactly
    /// the datagrams seen during the previous minute.
    pub fn tick_datagram(
        &mut self,
        timestamp: DateTime<Utc>,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        total_len: u16,
    ) -> Option<MinuteReport> {
        let minute = timestamp.timestamp().div_euclid(60);
        let report = match self.current {
            Some((open, _)) if open == minute => None,
            Some((_, start)) => {
                let report = MinuteReport {
                    minute: start,
                    received_bytes: self.received,
                    sent_bytes: self.sent,
                };
                self.received = 0;
                self.sent = 0;
                self.current = Some((minute, minute_start(timestamp)));
                Some(report)
            }
            None => {
                self.current = Some((minute, minute_start(timestamp)));
                None
            }
        };

        if destination == self.report_addr {
            self.received += u64::from(total_len);
        }
        if source == self.report_addr {
            self.sent += u64::from(total_len);
        }
        report
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

fn minute_start(timestamp: DateTime<Utc>) -> DateTime<Local> {
    let local = timestamp.with_timezone(&Local);
    local
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local)
}
