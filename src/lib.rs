//! # Bmctty
//!
//! A prompt-driven automation engine for BMC management CLIs and the host
//! consoles behind them.
//!
//! The management shells this crate targets expose no machine-parseable
//! protocol: every interaction is "send a line, wait for a recognizable
//! prompt in the returned byte stream, extract the meaningful portion".
//! Bmctty packages that turn-taking as a library — prompt/response framing,
//! scope navigation across the CLI's command tree, embedded yes/no
//! confirmations, timeout-bounded waits, and a layered login-shell automaton
//! that recovers real exit codes from a host shell via a sentinel prompt.
//!
//! The transport stays external: the crate runs the system `ssh` client (or
//! any command speaking the same protocol) inside a locally-allocated PTY and
//! drives its byte stream.
//!
//! ## Quick start
//!
//! ```no_run
//! use bmctty::{PowerControl, Session};
//!
//! #[tokio::main]
//! async fn main() -> bmctty::Result<()> {
//!     let mut session = Session::connect("10.0.0.1:22", "admin", "password").await?;
//!     println!("system is powered {}", session.power_state().await?);
//!
//!     let response = session.send_command("/bios/memory/show detail").await?;
//!     println!("{response}");
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Reaching the host console
//!
//! [`Session::open_console`] switches the shared stream over to the attached
//! host; [`Shell::login`] then runs the login handshake and installs the
//! sentinel prompt that makes exit codes reliable:
//!
//! ```no_run
//! use bmctty::{Session, Shell};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> bmctty::Result<()> {
//!     let mut session = Session::connect("10.0.0.1:22", "admin", "password").await?;
//!
//!     let console = session.open_console().await?;
//!     let mut shell = Shell::login(console, "root", "hunter2").await?;
//!     shell.wait_for_booted(Some(Duration::from_secs(300))).await?;
//!
//!     let ret = shell.run("uname -a").await?;
//!     println!("rc={} output={}", ret.rc, ret.output);
//!
//!     shell.logout().await?;
//!     session.close_console().await?;
//!     session.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pattern waits
//!
//! [`Expector`] is the primitive everything else is built on: it accumulates
//! stream output on a dedicated reader thread and waits, deadline-bounded,
//! for a regex to match. It is public so callers can drive prompts the
//! library does not know about.

pub mod detail;
pub mod error;
pub mod expect;
pub mod power;
pub(crate) mod reader;
pub mod redfish;
pub mod session;
pub mod shell;
pub mod terminal;

pub use detail::parse_detail;
pub use error::{Error, Result};
pub use expect::{ExpectMatch, Expector};
pub use power::{PowerControl, PowerState};
pub use redfish::RedfishInfo;
pub use session::{Console, Session};
pub use shell::{CmdRet, Shell};
pub use terminal::Terminal;
