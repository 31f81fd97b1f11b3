//! Chassis power control on top of [`Session`].

use crate::detail::parse_detail;
use crate::error::{Error, Result};
use crate::session::Session;
use async_trait::async_trait;
use std::fmt;

/// Chassis power state as reported by `show detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Unknown,
    Off,
    On,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerState::Unknown => "Unknown",
            PowerState::Off => "Off",
            PowerState::On => "On",
        })
    }
}

/// The capability surface domain tooling consumes: chassis power control on
/// top of plain command execution. Implemented by the one concrete session
/// type; wrappers take the trait so they stay testable against fakes.
#[async_trait]
pub trait PowerControl {
    async fn power_state(&mut self) -> Result<PowerState>;
    async fn power_on(&mut self) -> Result<()>;
    async fn power_off(&mut self) -> Result<()>;
    async fn power_cycle(&mut self) -> Result<()>;
}

#[async_trait]
impl PowerControl for Session {
    async fn power_state(&mut self) -> Result<PowerState> {
        let cmd = "/chassis/show detail";
        let response = self.send_command(cmd).await?;
        let details = parse_detail(&response);

        match details.get("Power").map(String::as_str) {
            Some("on") => Ok(PowerState::On),
            Some("off") => Ok(PowerState::Off),
            Some(other) => Err(Error::Command {
                cmd: cmd.to_string(),
                response,
                reason: format!("bad power state '{other}'"),
            }),
            None => Err(Error::Command {
                cmd: cmd.to_string(),
                response,
                reason: "did not find power state in response".to_string(),
            }),
        }
    }

    async fn power_on(&mut self) -> Result<()> {
        power_cmd(self, "on").await
    }

    async fn power_off(&mut self) -> Result<()> {
        power_cmd(self, "off").await
    }

    async fn power_cycle(&mut self) -> Result<()> {
        power_cmd(self, "cycle").await
    }
}

async fn power_cmd(session: &mut Session, action: &str) -> Result<()> {
    session
        .send_command(&format!("/chassis/power {action}"))
        .await
        .map(|_| ())
}
