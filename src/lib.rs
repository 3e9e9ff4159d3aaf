//! Ethernet traffic accounting and plaintext FTP login extraction.
//!
//! Frames come from libpcap ([`sniff`]) and go through a single
//! [`monitor::Monitor`], which decodes them ([`parser`]), accounts bytes per
//! peer ([`traffic`]), correlates FTP logins ([`login`]) and appends the
//! results to disk ([`db`]).

pub mod config;
pub mod db;
pub mod error;
pub mod login;
pub mod models;
pub mod monitor;
pub mod parser;
pub mod sniff;
pub mod table;
pub mod traffic;

pub use config::{Config, TransportProtocol};
pub use db::{EventSink, LoginStore};
pub use error::{CaptureError, ConfigError, CorrelateError, DecodeError, SinkError};
pub use models::{Direction, LoginRecord, LoginStatus, MinuteReport};
pub use monitor::{FrameOutput, Monitor, MonitorStats};
