//! FTP control-channel login correlation.
//!
//! One [`LoginSession`] per server address. Commands are read from frames
//! sent by the watched host, replies from frames the server sends back:
//!
//! ```text
//! Idle --USER--> AwaitingPassword --PASS--> AwaitingResponse --230/530--> Idle
//!                     |   ^                      |   ^
//!                     +331+                      +331+
//! ```
//!
//! Matching is done on a single frame's payload. A command or reply split
//! across segments is not recognized.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use crate::error::CorrelateError;
use crate::models::{Direction, LoginRecord, LoginStatus};
use crate::table::BoundedTable;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    User(&'a [u8]),
    Pass(&'a [u8]),
}

impl<'a> Command<'a> {
    fn name(&self) -> &'static str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
        }
    }

    /// Cuts the argument at its first CR LF.
    fn terminated(self) -> Result<Self, CorrelateError> {
        let (Command::User(arg) | Command::Pass(arg)) = self;
        let end = arg
            .windows(CRLF.len())
            .position(|w| w == CRLF)
            .ok_or(CorrelateError::MalformedCommand { command: self.name() })?;
        Ok(match self {
            Command::User(_) => Command::User(&arg[..end]),
            Command::Pass(_) => Command::Pass(&arg[..end]),
        })
    }
}

/// Reply codes that move a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// 331 User name okay, need password.
    NeedPassword,
    /// 230 User logged in.
    LoggedIn,
    /// 530 Not logged in.
    NotLoggedIn,
}

/// Reads a `USER ` or `PASS ` command. The argument ends at the first CR LF
/// inside `payload`; the search never looks past the captured bytes.
pub fn parse_command(payload: &[u8]) -> Result<Option<Command<'_>>, CorrelateError> {
    let command = if let Some(rest) = payload.strip_prefix(b"USER ") {
        Command::User(rest)
    } else if let Some(rest) = payload.strip_prefix(b"PASS ") {
        Command::Pass(rest)
    } else {
        return Ok(None);
    };
    command.terminated().map(Some)
}

pub fn parse_reply(payload: &[u8]) -> Option<Reply> {
    match payload.get(..3)? {
        b"331" => Some(Reply::NeedPassword),
        b"230" => Some(Reply::LoggedIn),
        b"530" => Some(Reply::NotLoggedIn),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    AwaitingPassword { username: String },
    AwaitingResponse { username: String, password: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    pub state: LoginState,
    /// Intermediate 331 replies seen during the current attempt.
    pub replies: u32,
    /// Attempts finalized for this server so far.
    pub completed: u32,
}

impl LoginSession {
    fn new() -> Self {
        Self {
            state: LoginState::Idle,
            replies: 0,
            completed: 0,
        }
    }

    fn reset(&mut self) {
        self.state = LoginState::Idle;
        self.replies = 0;
    }
}

/// What a frame did to the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    UsernameCaptured,
    PasswordCaptured,
    ReplyCounted,
    Completed(LoginRecord),
}

#[derive(Debug, Clone)]
pub struct LoginCorrelator {
    sessions: BoundedTable<Ipv4Addr, LoginSession>,
}

impl LoginCorrelator {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: BoundedTable::with_capacity(capacity),
        }
    }

    pub fn session(&self, server: Ipv4Addr) -> Option<&LoginSession> {
        self.sessions.get(&server)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Feeds one frame's transport payload.
    ///
    /// `direction` is relative to the watched host: outbound frames carry
    /// commands to `destination`, inbound frames carry replies from `source`.
    pub fn observe(
        &mut self,
        direction: Direction,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        payload: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<Outcome, CorrelateError> {
        match direction {
            Direction::Outbound => self.on_command(destination, payload),
            Direction::Inbound => Ok(self.on_reply(source, payload, timestamp)),
            Direction::Unrelated => Ok(Outcome::Ignored),
        }
    }

    fn on_command(&mut self, server: Ipv4Addr, payload: &[u8]) -> Result<Outcome, CorrelateError> {
        let command = match parse_command(payload) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Outcome::Ignored),
            Err(err) => {
                if let Some(session) = self.sessions.get_mut(&server) {
                    session.reset();
                }
                return Err(err);
            }
        };

        match command {
            Command::User(name) => {
                let session = self.sessions.get_or_insert_with(server, LoginSession::new)?;
                session.reset();
                let username = String::from_utf8_lossy(name).into_owned();
                tracing::debug!(%server, %username, "captured {}", command.name());
                session.state = LoginState::AwaitingPassword { username };
                Ok(Outcome::UsernameCaptured)
            }
            Command::Pass(secret) => {
                let Some(session) = self.sessions.get_mut(&server) else {
                    return Ok(Outcome::Ignored);
                };
                let LoginState::AwaitingPassword { username } = &mut session.state else {
                    return Ok(Outcome::Ignored);
                };
                let username = std::mem::take(username);
                tracing::debug!(%server, %username, "captured {}", command.name());
                session.state = LoginState::AwaitingResponse {
                    username,
                    password: String::from_utf8_lossy(secret).into_owned(),
                };
                Ok(Outcome::PasswordCaptured)
            }
        }
    }

    fn on_reply(&mut self, server: Ipv4Addr, payload: &[u8], timestamp: DateTime<Utc>) -> Outcome {
        let Some(reply) = parse_reply(payload) else {
            return Outcome::Ignored;
        };
        let Some(session) = self.sessions.get_mut(&server) else {
            return Outcome::Ignored;
        };

        match (reply, &mut session.state) {
            (_, LoginState::Idle) => Outcome::Ignored,
            (Reply::NeedPassword, _) => {
                session.replies += 1;
                Outcome::ReplyCounted
            }
            (_, LoginState::AwaitingPassword { .. }) => Outcome::Ignored,
            (
                reply @ (Reply::LoggedIn | Reply::NotLoggedIn),
                LoginState::AwaitingResponse { username, password },
            ) => {
                let record = LoginRecord {
                    server,
                    username: std::mem::take(username),
                    password: std::mem::take(password),
                    status: if reply == Reply::LoggedIn {
                        LoginStatus::Ok
                    } else {
                        LoginStatus::Failed
                    },
                    timestamp,
                };
                session.reset();
                session.completed += 1;
                Outcome::Completed(record)
            }
        }
    }
}
