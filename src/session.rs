//! Stateful driver for the management controller's prompt-tree CLI.
//!
//! The remote shell has no machine-parseable protocol: every interaction is
//! "send a line, wait for a recognizable prompt in the byte stream, extract
//! the part in between". [`Session`] owns that turn-taking, the scope
//! navigation on top of it, and the console bridge into the attached host.

use crate::error::{Error, Result};
use crate::expect::{ExpectMatch, Expector};
use crate::terminal::Terminal;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CTRL_X: &str = "\x18";

/// Pager suppression modifier appended to plain commands.
const NO_MORE: &str = " | no-more";

/// Commands that go out verbatim: the pager modifier is either invalid for
/// them or already implied.
const VERBATIM_CMDS: &[&str] = &["commit", "top", "scope", "set", "power"];

// The first prompt after connect carries the device serial. Later prompts
// are `<serial># `, `<serial> /path # `, or `<serial> /path *# ` while a
// change is uncommitted.
static DISCOVERY_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([-0-9a-zA-Z]*)# ").unwrap());

/// Confirmation sub-dialog, with either answer as the default.
const CONFIRM_PATTERN: &str = r"Do you want to continue\?\[([yY]\|[nN])\]";
static CONFIRM: Lazy<Regex> = Lazy::new(|| Regex::new(CONFIRM_PATTERN).unwrap());

// The ssh client's own password sub-dialog, or the CLI prompt directly when
// the transport authenticates some other way.
static PASSWORD_OR_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Pp]assword: |([-0-9a-zA-Z]*)# ").unwrap());

static ESCAPE_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Press Ctrl\+x to Exit the session").unwrap());

/// A connected management CLI session.
///
/// All operations are sequential; the underlying stream must never be driven
/// from two places at once. While a [`Console`] from
/// [`open_console`](Session::open_console) is alive the session itself is
/// unusable, which is exactly the single-driver rule.
pub struct Session {
    term: Terminal,
    exp: Expector,
    desc: String,
    scope: String,
    prompt: Regex,
    prompt_or_confirm: Regex,
}

impl Session {
    /// Connect to `user@addr` over ssh and wait for the first CLI prompt.
    ///
    /// `addr` is `host` or `host:port`. The prompt patterns for the rest of
    /// the session's life are derived from the serial token discovered here.
    pub async fn connect(addr: &str, user: &str, secret: &str) -> Result<Session> {
        info!("connecting to {user}@{addr}");

        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => (addr, "22"),
        };

        let args = vec![
            "-tt".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-p".to_string(),
            port.to_string(),
            format!("{user}@{host}"),
        ];

        Self::establish("ssh", &args, Some(secret), format!("{user}@{addr}")).await
    }

    /// Drive any local command that speaks the management CLI protocol on its
    /// stdio — normally `ssh`, but a serial concentrator client or a test
    /// fixture works the same way.
    pub async fn spawn_with(command: &str, args: &[String], secret: Option<&str>) -> Result<Session> {
        Self::establish(command, args, secret, command.to_string()).await
    }

    async fn establish(
        command: &str,
        args: &[String],
        secret: Option<&str>,
        label: String,
    ) -> Result<Session> {
        let (mut term, rx) = Terminal::spawn(command, args)?;
        let mut exp = Expector::new(rx);

        let found = exp
            .expect(&PASSWORD_OR_PROMPT, DEFAULT_TIMEOUT)
            .await
            .map_err(connect_error)?;

        let mut serial = found.groups.first().cloned().flatten();
        if serial.is_none() {
            // The transport asked for a password before the CLI appeared.
            let secret = secret.ok_or_else(|| {
                Error::connection("remote asked for a password but none was provided")
            })?;
            term.send_line(secret)?;
            let found = exp
                .expect(&DISCOVERY_PROMPT, DEFAULT_TIMEOUT)
                .await
                .map_err(connect_error)?;
            serial = found.groups.first().cloned().flatten();
        }
        let serial = serial.unwrap_or_default();

        let prompt_src = format!(r"({})([ ](/[^ ]*)[ ]){{0,1}}([*]*)(#) ", regex::escape(&serial));
        let prompt = Regex::new(&prompt_src).map_err(Error::connection)?;
        let prompt_or_confirm =
            Regex::new(&format!("{prompt_src}|{CONFIRM_PATTERN}")).map_err(Error::connection)?;

        info!("connected to {label} [{serial}]");

        Ok(Session {
            term,
            exp,
            desc: format!("{label} [{serial}]"),
            scope: String::new(),
            prompt,
            prompt_or_confirm,
        })
    }

    /// The scope path most recently navigated to; empty means top.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Send a command and return its response text.
    ///
    /// A leading `/` makes the command absolute: `/bios/memory/show detail`
    /// first navigates `top`, then `scope bios/memory`, then runs
    /// `show detail` there. Navigation always restarts from top, so a stale
    /// scope left by an earlier error cannot mislead it.
    pub async fn send_command(&mut self, msg: &str) -> Result<String> {
        match split_absolute(msg) {
            Some((scope, cmd)) => {
                self.run_one("top").await?;
                self.run_one(&format!("scope {scope}")).await?;
                self.run_one(&cmd).await
            }
            None => self.run_one(msg).await,
        }
    }

    async fn run_one(&mut self, msg: &str) -> Result<String> {
        let send = decorate(msg);
        debug!("sending '{send}'");
        self.term.send_line(&send)?;

        // The response holds the echoed command, the output lines, and the
        // prompt — or a confirmation sub-dialog instead of the prompt.
        let found = self
            .exp
            .expect(&self.prompt_or_confirm, DEFAULT_TIMEOUT)
            .await?;
        let mut data = found.text;

        if CONFIRM.is_match(&data) {
            self.term.send_line("y")?;
            let after = self
                .exp
                .expect(&self.prompt, DEFAULT_TIMEOUT)
                .await
                .map_err(|e| confirm_error(&send, e))?;
            data.push_str(&after.text);
        }

        let Some((response, error_line)) = extract_response(&data) else {
            return Err(Error::Command {
                cmd: send,
                response: data,
                reason: "failed to parse response".to_string(),
            });
        };

        if let Some(line) = error_line {
            return Err(Error::Command {
                cmd: send,
                response,
                reason: line,
            });
        }

        if msg == "top" {
            self.scope.clear();
        } else if let Some(path) = msg.strip_prefix("scope ") {
            self.scope = path.trim().to_string();
        }

        Ok(response)
    }

    /// Hand the stream over to the attached host's console, as typing
    /// `connect host` would. The session cannot be driven again until the
    /// returned handle is gone and [`close_console`](Session::close_console)
    /// has restored the CLI regime.
    pub async fn open_console(&mut self) -> Result<Console<'_>> {
        self.term.send_line("connect host")?;
        self.exp.expect(&ESCAPE_BANNER, DEFAULT_TIMEOUT).await?;
        Ok(Console {
            term: &mut self.term,
            exp: &mut self.exp,
        })
    }

    /// Leave the host console and wait for the CLI prompt to reappear.
    pub async fn close_console(&mut self) -> Result<()> {
        self.send_command(CTRL_X).await.map(|_| ())
    }

    /// Tear down the terminal automation and the transport.
    pub fn close(mut self) -> Result<()> {
        self.term.shutdown()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.desc)
    }
}

/// Handle over the shared stream while the host console, not the management
/// CLI, is on the other end. Exactly one automaton regime owns the stream's
/// framing at a time; holding a `Console` is holding that ownership.
pub struct Console<'s> {
    term: &'s mut Terminal,
    exp: &'s mut Expector,
}

impl<'s> Console<'s> {
    /// Build a console from externally-opened parts, for host shells reached
    /// over something other than the CLI's bridge (a serial-over-LAN client,
    /// a test fixture).
    pub fn from_parts(term: &'s mut Terminal, exp: &'s mut Expector) -> Self {
        Console { term, exp }
    }

    /// Write raw bytes to the console.
    pub fn send(&mut self, data: &str) -> Result<()> {
        self.term.send(data.as_bytes())
    }

    /// Write a newline-terminated line to the console.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.term.send_line(line)
    }

    /// Wait for `pattern` in the console output.
    pub async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<ExpectMatch> {
        self.exp.expect(pattern, timeout).await
    }
}

fn connect_error(e: Error) -> Error {
    match e {
        Error::Timeout { timeout, buffered } => Error::connection(format!(
            "no prompt within {timeout:?}, saw: {buffered:?}"
        )),
        other => other,
    }
}

fn confirm_error(cmd: &str, e: Error) -> Error {
    match e {
        Error::Timeout { timeout, buffered } => Error::Command {
            cmd: cmd.to_string(),
            response: buffered,
            reason: format!("no prompt within {timeout:?} after confirming"),
        },
        other => other,
    }
}

/// Split an absolute command (`/a/b/cmd args`) into its scope path and the
/// command line to run there.
fn split_absolute(msg: &str) -> Option<(String, String)> {
    if !msg.starts_with('/') {
        return None;
    }

    let mut fields = msg.split_whitespace();
    let head = fields.next()?;
    let toks: Vec<&str> = head.split('/').collect();

    let cmd = *toks.last()?;
    let scope = toks[1..toks.len() - 1].join("/");

    let rest: Vec<&str> = fields.collect();
    let cmd_line = if rest.is_empty() {
        cmd.to_string()
    } else {
        format!("{cmd} {}", rest.join(" "))
    };

    Some((scope, cmd_line))
}

/// Append the pager-suppression modifier unless the command's first word is
/// exempt or the text already pipes somewhere.
fn decorate(msg: &str) -> String {
    let first = msg.split_whitespace().next().unwrap_or("");
    if msg.contains('|') || VERBATIM_CMDS.contains(&first) {
        msg.to_string()
    } else {
        format!("{msg}{NO_MORE}")
    }
}

/// Split raw matched data into the logical response text and an optional
/// trailing error line. Returns `None` when fewer than two lines are
/// recoverable.
///
/// The first line is the echoed command and the last is the prompt; both are
/// dropped, as is any interior line that is merely a repeated copy of the
/// prompt line.
fn extract_response(data: &str) -> Option<(String, Option<String>)> {
    let data = data.replace('\r', "");
    let lines: Vec<&str> = data.split('\n').collect();
    if lines.len() < 2 {
        return None;
    }

    let prompt_line = lines[lines.len() - 1].trim();
    let kept: Vec<&str> = lines[1..lines.len() - 1]
        .iter()
        .copied()
        .filter(|line| line.trim() != prompt_line)
        .collect();

    let error_line = kept
        .last()
        .filter(|line| line.starts_with("Error:"))
        .map(|line| line.to_string());

    let mut response = kept.join("\n");
    response.push('\n');
    Some((response, error_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorate_appends_no_more() {
        assert_eq!(decorate("show detail"), "show detail | no-more");
    }

    #[test]
    fn test_decorate_exempt_verbs() {
        for cmd in ["top", "scope chassis", "set enabled yes", "commit", "power off"] {
            assert_eq!(decorate(cmd), cmd, "'{cmd}' must go out verbatim");
        }
    }

    #[test]
    fn test_decorate_existing_pipe() {
        assert_eq!(decorate("show tech | include fan"), "show tech | include fan");
    }

    #[test]
    fn test_split_absolute() {
        let (scope, cmd) = split_absolute("/bios/memory/show detail").unwrap();
        assert_eq!(scope, "bios/memory");
        assert_eq!(cmd, "show detail");
    }

    #[test]
    fn test_split_absolute_single_scope() {
        let (scope, cmd) = split_absolute("/chassis/power cycle").unwrap();
        assert_eq!(scope, "chassis");
        assert_eq!(cmd, "power cycle");
    }

    #[test]
    fn test_split_absolute_relative_passthrough() {
        assert!(split_absolute("show detail").is_none());
        assert!(split_absolute("top").is_none());
    }

    #[test]
    fn test_extract_response_drops_echo_and_prompt() {
        let data = "show detail | no-more\r\n\r\nChassis:\r\n    Power: on\r\nSRL# ";
        let (response, err) = extract_response(data).unwrap();
        assert_eq!(response, "\nChassis:\n    Power: on\n");
        assert!(err.is_none());
    }

    #[test]
    fn test_extract_response_filters_repeated_prompt_lines() {
        let data = "show foo | no-more\r\nSRL# \r\nline one\r\nSRL# \r\nline two\r\nSRL# ";
        let (response, err) = extract_response(data).unwrap();
        assert_eq!(response, "line one\nline two\n");
        assert!(err.is_none());
    }

    #[test]
    fn test_extract_response_error_marker() {
        let data = "scope nope\r\nError: invalid scope\r\nSRL# ";
        let (response, err) = extract_response(data).unwrap();
        assert_eq!(response, "Error: invalid scope\n");
        assert_eq!(err.as_deref(), Some("Error: invalid scope"));
    }

    #[test]
    fn test_extract_response_too_short() {
        assert!(extract_response("just one line").is_none());
    }

    #[test]
    fn test_confirm_pattern_both_defaults() {
        assert!(CONFIRM.is_match("Do you want to continue?[y|N]"));
        assert!(CONFIRM.is_match("Do you want to continue?[Y|n]"));
        assert!(!CONFIRM.is_match("Do you want to continue?[maybe]"));
    }

    #[test]
    fn test_prompt_pattern_shapes() {
        let serial = "WZP2326007Q";
        let src = format!(r"({})([ ](/[^ ]*)[ ]){{0,1}}([*]*)(#) ", regex::escape(serial));
        let prompt = Regex::new(&src).unwrap();

        assert!(prompt.is_match("WZP2326007Q# "));
        assert!(prompt.is_match("WZP2326007Q /chassis # "));
        assert!(prompt.is_match("WZP2326007Q /bios/memory *# "));
        assert!(!prompt.is_match("OTHERSERIAL# "));
    }
}
