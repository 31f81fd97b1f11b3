//! Login automaton for the host shell reached through the console bridge.
//!
//! A login shell's prompt is free-form and cannot delimit command output
//! from a return code, so right after logging in the automaton rewrites the
//! prompt to a deterministic sentinel that embeds the previous exit code.
//! Every command execution afterwards is a single send-and-wait against that
//! sentinel.

use crate::error::{Error, Result};
use crate::expect::ExpectMatch;
use crate::session::Console;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
// Systemd stop jobs are given well over their 90 s to finish up.
const POWEROFF_TIMEOUT: Duration = Duration::from_secs(200);
const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The sentinel installed by the bootstrap: a line holding nothing but the
/// previous exit code and a terminator.
static EXIT_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n exitcode=([0-9]+) [$] ").unwrap());

static LOGIN_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new("login:").unwrap());
static PASSWORD_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new("Password:").unwrap());
static RAW_SHELL_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(bash-4[.0-9]*#|\[root@[-a-z]* ~\]#)").unwrap());
// Tolerates both "login:" and "Login:" after a logout.
static RELOGIN_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new("ogin:").unwrap());
static POWER_DOWN: Lazy<Regex> = Lazy::new(|| Regex::new("Power down").unwrap());

/// One command execution on the login shell.
///
/// Created per invocation and immutable afterwards. A nonzero `rc` is a
/// normal result, not an error; harness-level failures surface as
/// [`Error`](crate::Error) values instead.
#[derive(Debug, Clone)]
pub struct CmdRet {
    pub cmd: String,
    pub output: String,
    pub rc: i32,
    pub elapsed: Duration,
}

impl CmdRet {
    /// Render the result with every line prefixed by `indent`.
    pub fn indented(&self, indent: &str) -> String {
        format!(
            "\n{indent}Command: {}\n{indent}rc: {}\n{indent}elapsed: {:.3}\n{indent}output: {}\n",
            self.cmd,
            self.rc,
            self.elapsed.as_secs_f64(),
            self.output.replace('\n', &format!("\n{indent}  ")),
        )
    }

    /// Whether `pattern` matches anywhere in the output.
    pub fn matches(&self, pattern: &str) -> Result<bool> {
        let re = Regex::new(pattern).map_err(|e| self.error(format!("bad match pattern '{pattern}': {e}")))?;
        Ok(re.is_match(&self.output))
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::Command {
            cmd: self.cmd.clone(),
            response: self.output.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CmdRet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.indented(""))
    }
}

/// A host login shell bootstrapped for scripted execution.
///
/// Existing at all means the sentinel bootstrap completed. The stream stays
/// borrowed from the console bridge for the automaton's whole life, and the
/// operations that leave the shell in an unknown position ([`logout`],
/// [`poweroff`], [`reboot`]) consume it so it cannot be reused.
///
/// [`logout`]: Shell::logout
/// [`poweroff`]: Shell::poweroff
/// [`reboot`]: Shell::reboot
pub struct Shell<'s> {
    console: Console<'s>,
}

impl<'s> Shell<'s> {
    /// Drive the `login:`/`Password:` handshake, then install the sentinel
    /// prompt that exit-code extraction relies on.
    pub async fn login(mut console: Console<'s>, user: &str, password: &str) -> Result<Shell<'s>> {
        console.send("\n")?;
        expect_stage(&mut console, &LOGIN_PROMPT, "waiting for login prompt").await?;

        console.send_line(user)?;
        expect_stage(&mut console, &PASSWORD_PROMPT, "waiting for password prompt").await?;

        console.send_line(password)?;
        expect_stage(&mut console, &RAW_SHELL_PROMPT, "waiting for shell prompt").await?;

        // Colors, echoed input, and a free-form prompt all get in the way of
        // framing; strip them and put the exit code on the prompt itself.
        console.send_line("export SYSTEMD_COLORS=0")?;
        console.send_line("stty -echo")?;
        console.send("PS1='\n exitcode=$? $ '\n")?;
        expect_stage(&mut console, &EXIT_CODE, "installing sentinel prompt").await?;

        Ok(Shell { console })
    }

    /// Run `cmd` with the default timeout.
    pub async fn run(&mut self, cmd: &str) -> Result<CmdRet> {
        self.run_timeout(cmd, DEFAULT_TIMEOUT).await
    }

    /// Run `cmd`, waiting up to `timeout` for the sentinel to come back.
    ///
    /// A timeout means the command never completed; the shell's position is
    /// unknown to the caller, who decides whether that is fatal.
    pub async fn run_timeout(&mut self, cmd: &str, timeout: Duration) -> Result<CmdRet> {
        debug!("sending cmd {cmd}");
        let ret = self.send_cmd(cmd, timeout).await?;
        debug!("{}", ret.indented("  "));
        Ok(ret)
    }

    /// Run `cmd` and fail unless it exited 0.
    pub async fn check_only(&mut self, cmd: &str) -> Result<CmdRet> {
        self.check_rc(cmd, 0, DEFAULT_TIMEOUT).await
    }

    /// Run `cmd` and fail unless it exited with `rc`, embedding the full
    /// result in the failure.
    pub async fn check_rc(&mut self, cmd: &str, rc: i32, timeout: Duration) -> Result<CmdRet> {
        let ret = self.run_timeout(cmd, timeout).await?;
        if ret.rc != rc {
            let reason = format!(
                "expected rc {rc}, found {} after {:.3}s",
                ret.rc,
                ret.elapsed.as_secs_f64()
            );
            return Err(ret.error(reason));
        }
        Ok(ret)
    }

    /// Log out and wait for the login prompt to come back. Success or not,
    /// the automaton is consumed: past this point its position is unknown.
    pub async fn logout(mut self) -> Result<()> {
        self.console.send_line("logout")?;
        self.console
            .expect(&RELOGIN_PROMPT, DEFAULT_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                Error::Timeout { timeout, buffered } => Error::Command {
                    cmd: "logout".to_string(),
                    response: buffered,
                    reason: format!("no login prompt within {timeout:?} after logout"),
                },
                other => other,
            })
    }

    /// Power the machine off and wait for the final power-down banner.
    /// Cannot go through [`run`](Shell::run) for the obvious reason: the
    /// sentinel never comes back.
    pub async fn poweroff(mut self) -> Result<()> {
        info!("sending poweroff");
        self.console.send_line("poweroff")?;
        self.console
            .expect(&POWER_DOWN, POWEROFF_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Send a reboot and return immediately; the stream is expected to drop.
    pub async fn reboot(mut self) -> Result<()> {
        info!("rebooting");
        self.console.send_line("reboot")
    }

    /// Poll systemd until the host reports `running`.
    ///
    /// `limit` bounds the whole wait; `None` keeps polling for as long as
    /// the host keeps answering `starting`. A `degraded` report is fatal and
    /// triggers one diagnostic pass over the failed units first.
    pub async fn wait_for_booted(&mut self, limit: Option<Duration>) -> Result<()> {
        let deadline = limit.map(|d| tokio::time::Instant::now() + d);
        loop {
            let ret = self.run("systemctl is-system-running").await?;
            if ret.rc != 0 && ret.rc != 1 {
                return Err(ret.error(format!("unexpected rc {}", ret.rc)));
            }

            match ret.output.trim() {
                "initializing" | "starting" => {
                    if let Some(deadline) = deadline {
                        if tokio::time::Instant::now() >= deadline {
                            return Err(ret.error("system did not finish booting in time"));
                        }
                    }
                    tokio::time::sleep(BOOT_POLL_INTERVAL).await;
                }
                "degraded" => {
                    if let Ok(status) = self
                        .run("systemctl status --no-pager --full --state=failed '*'")
                        .await
                    {
                        error!("failed units:{}", status.indented("  "));
                    }
                    return Err(ret.error("system boot is degraded"));
                }
                "running" => {
                    info!("system is running");
                    return Ok(());
                }
                state => {
                    return Err(ret.error(format!("system boot is in unexpected state '{state}'")));
                }
            }
        }
    }

    async fn send_cmd(&mut self, cmd: &str, timeout: Duration) -> Result<CmdRet> {
        let start = Instant::now();
        self.console.send_line(cmd)?;

        let found = self.console.expect(&EXIT_CODE, timeout).await?;

        let rc_str = found
            .groups
            .first()
            .cloned()
            .flatten()
            .ok_or_else(|| Error::ResultParse {
                cmd: cmd.to_string(),
                capture: String::new(),
            })?;
        let rc: i32 = rc_str.parse().map_err(|_| Error::ResultParse {
            cmd: cmd.to_string(),
            capture: rc_str.clone(),
        })?;

        let output = found
            .text
            .strip_suffix(found.matched.as_str())
            .unwrap_or(&found.text)
            .trim()
            .replace('\r', "");

        Ok(CmdRet {
            cmd: cmd.to_string(),
            output,
            rc,
            elapsed: start.elapsed(),
        })
    }
}

async fn expect_stage(
    console: &mut Console<'_>,
    pattern: &Regex,
    stage: &'static str,
) -> Result<ExpectMatch> {
    console
        .expect(pattern, DEFAULT_TIMEOUT)
        .await
        .map_err(|e| match e {
            Error::Timeout { timeout, buffered } => Error::Login {
                stage,
                reason: format!("no match within {timeout:?}, got text: {buffered:?}"),
            },
            other => Error::Login {
                stage,
                reason: other.to_string(),
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_captures_exit_code() {
        let caps = EXIT_CODE.captures("output line\n exitcode=42 $ ").unwrap();
        assert_eq!(&caps[1], "42");
    }

    #[test]
    fn test_sentinel_rejects_uninstalled_prompt() {
        // The raw assignment echoes "$?" literally and must not match.
        assert!(!EXIT_CODE.is_match("PS1='\n exitcode=$? $ '"));
    }

    #[test]
    fn test_raw_shell_prompt_forms() {
        assert!(RAW_SHELL_PROMPT.is_match("bash-4.4# "));
        assert!(RAW_SHELL_PROMPT.is_match("[root@somehost ~]# "));
        assert!(!RAW_SHELL_PROMPT.is_match("zsh% "));
    }

    #[test]
    fn test_cmdret_indented() {
        let ret = CmdRet {
            cmd: "uname".to_string(),
            output: "Linux\nhost".to_string(),
            rc: 0,
            elapsed: Duration::from_millis(1500),
        };
        let text = ret.indented("  ");
        assert!(text.contains("  Command: uname"));
        assert!(text.contains("  rc: 0"));
        assert!(text.contains("  elapsed: 1.500"));
        assert!(text.contains("\n    host"));
    }

    #[test]
    fn test_cmdret_matches() {
        let ret = CmdRet {
            cmd: "systemctl is-system-running".to_string(),
            output: "degraded".to_string(),
            rc: 1,
            elapsed: Duration::from_secs(1),
        };
        assert!(ret.matches("degr.ded").unwrap());
        assert!(!ret.matches("running").unwrap());
        assert!(ret.matches("[unclosed").is_err());
    }
}
