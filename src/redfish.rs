//! Redfish endpoint toggling on top of [`Session`].

use crate::detail::parse_detail;
use crate::error::{Error, Result};
use crate::session::Session;
use std::collections::HashMap;

/// State of the controller's redfish endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedfishInfo {
    pub enabled: bool,
    pub active_sessions: u32,
    pub max_sessions: u32,
}

impl Session {
    /// Query whether redfish is enabled and how many sessions it carries.
    pub async fn redfish_info(&mut self) -> Result<RedfishInfo> {
        let cmd = "/redfish/show detail";
        let response = self.send_command(cmd).await?;
        let details = parse_detail(&response);

        let enabled = match details.get("Enabled").map(String::as_str) {
            Some("yes") => true,
            Some("no") => false,
            other => {
                let reason = format!("unknown redfish 'Enabled' setting: '{}'", other.unwrap_or(""));
                return Err(command_error(cmd, &response, reason));
            }
        };

        let active_sessions =
            count_field(&details, "Active Sessions").map_err(|reason| command_error(cmd, &response, reason))?;
        let max_sessions =
            count_field(&details, "Max Sessions").map_err(|reason| command_error(cmd, &response, reason))?;

        Ok(RedfishInfo {
            enabled,
            active_sessions,
            max_sessions,
        })
    }

    /// Turn the redfish endpoint on, if it is off.
    pub async fn redfish_enable(&mut self) -> Result<()> {
        self.set_redfish(true).await
    }

    /// Turn the redfish endpoint off, if it is on.
    pub async fn redfish_disable(&mut self) -> Result<()> {
        self.set_redfish(false).await
    }

    async fn set_redfish(&mut self, desired: bool) -> Result<()> {
        let info = self.redfish_info().await?;
        if info.enabled == desired {
            return Ok(());
        }

        let value = if desired { "yes" } else { "no" };
        // redfish_info leaves the session scoped to /redfish, where the
        // assignment and the commit belong.
        self.send_command(&format!("set enabled {value}")).await?;
        self.send_command("commit").await?;

        let verify = self.redfish_info().await.map_err(|e| Error::Command {
            cmd: "commit".to_string(),
            response: String::new(),
            reason: format!("failed to verify redfish status after commit: {e}"),
        })?;
        if verify.enabled != desired {
            return Err(command_error(
                "set enabled",
                "",
                format!("failed to set redfish enabled={desired}"),
            ));
        }

        Ok(())
    }
}

fn command_error(cmd: &str, response: &str, reason: String) -> Error {
    Error::Command {
        cmd: cmd.to_string(),
        response: response.to_string(),
        reason,
    }
}

fn count_field(details: &HashMap<String, String>, key: &str) -> std::result::Result<u32, String> {
    let value = details
        .get(key)
        .ok_or_else(|| format!("no '{key}' setting"))?;
    value
        .parse()
        .map_err(|_| format!("failed to parse '{key}' setting: '{value}'"))
}
