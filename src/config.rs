//! Startup configuration.
//!
//! Every value comes from the command line or the environment (a `.env` file
//! is honoured). Nothing about the watched hosts is compiled in.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::ConfigError;

/// Capacity of each flow table and of the login session table.
pub const TABLE_CAPACITY: usize = 100;

/// Default FTP control port.
pub const DEFAULT_PORT: u16 = 21;

/// Captures the whole frame on any MAC.
pub const DEFAULT_SNAPLEN: i32 = 65536;

pub const DEFAULT_TIMEOUT_MS: i32 = 1000;

/// Transport protocol used for both the capture filter and header decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// IANA protocol number carried in the IPv4 header.
    pub fn ip_number(self) -> u8 {
        match self {
            TransportProtocol::Tcp => 6,
            TransportProtocol::Udp => 17,
        }
    }

    /// Keyword used in BPF filter expressions.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Parser)]
#[command(name = "ftpwatch", version, about = "Per-host traffic accounting and plaintext FTP login capture")]
pub struct Args {
    /// Capture device name; the pcap default device when omitted.
    #[arg(short, long, env = "FTPWATCH_INTERFACE")]
    pub interface: Option<String>,

    /// Local address whose per-peer traffic is accounted.
    #[arg(short, long, env = "FTPWATCH_WATCH_ADDR", required_unless_present = "list_interfaces")]
    pub watch: Option<Ipv4Addr>,

    /// Local address whose throughput is reported every minute (defaults to --watch).
    #[arg(long, env = "FTPWATCH_REPORT_ADDR")]
    pub report_addr: Option<Ipv4Addr>,

    #[arg(long, value_enum, env = "FTPWATCH_PROTOCOL", default_value_t = TransportProtocol::Tcp)]
    pub protocol: TransportProtocol,

    #[arg(long, env = "FTPWATCH_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Full BPF expression; must name the configured protocol.
    #[arg(long, env = "FTPWATCH_FILTER")]
    pub filter: Option<String>,

    /// Append-only text log of login attempts.
    #[arg(long, env = "FTPWATCH_LOG_PATH", default_value = "record.csv")]
    pub log_path: PathBuf,

    /// Optional JSON-lines copy of every login record.
    #[arg(long, env = "FTPWATCH_JSON_LOG")]
    pub json_log: Option<PathBuf>,

    #[arg(long, env = "FTPWATCH_SNAPLEN", default_value_t = DEFAULT_SNAPLEN)]
    pub snaplen: i32,

    #[arg(long, env = "FTPWATCH_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: i32,

    /// Print the capture devices and exit.
    #[arg(long)]
    pub list_interfaces: bool,
}

/// Validated configuration handed to the monitor and the capture adapter.
#[derive(Debug, Clone)]
pub struct Config {
    pub interface: Option<String>,
    pub watch_addr: Ipv4Addr,
    pub report_addr: Ipv4Addr,
    pub protocol: TransportProtocol,
    pub filter: String,
    pub log_path: PathBuf,
    pub json_log: Option<PathBuf>,
    pub snaplen: i32,
    pub timeout_ms: i32,
}

impl Config {
    /// Builds a config for the given watched address with every other field defaulted.
    pub fn new(watch_addr: Ipv4Addr) -> Self {
        let protocol = TransportProtocol::Tcp;
        Self {
            interface: None,
            watch_addr,
            report_addr: watch_addr,
            protocol,
            filter: default_filter(protocol, DEFAULT_PORT),
            log_path: PathBuf::from("record.csv"),
            json_log: None,
            snaplen: DEFAULT_SNAPLEN,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// `watch` is required by clap unless `--list-interfaces` is given, so
    /// callers only reach this with an address present.
    pub fn from_args(args: Args, watch_addr: Ipv4Addr) -> Result<Self, ConfigError> {
        if args.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        let filter = match args.filter {
            Some(filter) => {
                validate_filter(&filter, args.protocol)?;
                filter
            }
            None => default_filter(args.protocol, args.port),
        };

        Ok(Self {
            interface: args.interface,
            watch_addr,
            report_addr: args.report_addr.unwrap_or(watch_addr),
            protocol: args.protocol,
            filter,
            log_path: args.log_path,
            json_log: args.json_log,
            snaplen: args.snaplen,
            timeout_ms: args.timeout_ms,
        })
    }
}

pub fn default_filter(protocol: TransportProtocol, port: u16) -> String {
    format!("{} port {}", protocol, port)
}

/// The decoder interprets transport headers as `protocol`, so a filter that
/// lets other protocols through would feed it frames it rejects.
fn validate_filter(filter: &str, protocol: TransportProtocol) -> Result<(), ConfigError> {
    let names_protocol = filter
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .any(|word| word.eq_ignore_ascii_case(protocol.as_str()));
    if names_protocol {
        Ok(())
    } else {
        Err(ConfigError::FilterProtocolMismatch {
            filter: filter.to_string(),
            protocol: protocol.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_build_tcp_ftp_filter() {
        let args = parse(&["ftpwatch", "--watch", "192.168.1.108"]);
        let watch = args.watch.unwrap();
        let config = Config::from_args(args, watch).unwrap();
        assert_eq!(config.filter, "tcp port 21");
        assert_eq!(config.protocol, TransportProtocol::Tcp);
        assert_eq!(config.report_addr, Ipv4Addr::new(192, 168, 1, 108));
        assert_eq!(config.log_path, PathBuf::from("record.csv"));
    }

    #[test]
    fn test_report_addr_can_differ_from_watch() {
        let args = parse(&[
            "ftpwatch",
            "--watch",
            "192.168.1.108",
            "--report-addr",
            "192.168.1.109",
        ]);
        let watch = args.watch.unwrap();
        let config = Config::from_args(args, watch).unwrap();
        assert_eq!(config.report_addr, Ipv4Addr::new(192, 168, 1, 109));
    }

    #[test]
    fn test_udp_protocol_changes_default_filter() {
        let args = parse(&["ftpwatch", "-w", "10.0.0.1", "--protocol", "udp", "--port", "69"]);
        let watch = args.watch.unwrap();
        let config = Config::from_args(args, watch).unwrap();
        assert_eq!(config.filter, "udp port 69");
        assert_eq!(config.protocol.ip_number(), 17);
    }

    #[test]
    fn test_custom_filter_must_name_protocol() {
        let args = parse(&["ftpwatch", "-w", "10.0.0.1", "--filter", "udp port 21"]);
        let watch = args.watch.unwrap();
        let err = Config::from_args(args, watch).unwrap_err();
        assert!(matches!(err, ConfigError::FilterProtocolMismatch { .. }));
    }

    #[test]
    fn test_custom_filter_with_parentheses_is_accepted() {
        let args = parse(&["ftpwatch", "-w", "10.0.0.1", "--filter", "(tcp) and port 2121"]);
        let watch = args.watch.unwrap();
        let config = Config::from_args(args, watch).unwrap();
        assert_eq!(config.filter, "(tcp) and port 2121");
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let args = parse(&["ftpwatch", "-w", "10.0.0.1", "--port", "0"]);
        let watch = args.watch.unwrap();
        assert!(matches!(Config::from_args(args, watch), Err(ConfigError::ZeroPort)));
    }

    #[test]
    fn test_watch_not_required_when_listing() {
        let args = parse(&["ftpwatch", "--list-interfaces"]);
        assert!(args.list_interfaces);
        assert!(args.watch.is_none());
    }
}
