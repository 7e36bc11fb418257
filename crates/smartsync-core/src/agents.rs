use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// Connection state of a polling agent.
///
/// Agents start `OFFLINE` and move to `ONLINE` on any authenticated call.
/// Nothing in-process moves them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl AgentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Online => "ONLINE",
            AgentStatus::Offline => "OFFLINE",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(AgentStatus::Online),
            "OFFLINE" => Ok(AgentStatus::Offline),
            other => Err(UnknownVariant {
                kind: "agent status",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of a queued write-back command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Delivered,
    Success,
    Failed,
}

impl CommandStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Delivered => "DELIVERED",
            CommandStatus::Success => "SUCCESS",
            CommandStatus::Failed => "FAILED",
        }
    }

    /// Only `SUCCESS` and `FAILED` may be reported by an acknowledgement.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Failed)
    }
}

impl FromStr for CommandStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(CommandStatus::Pending),
            "DELIVERED" => Ok(CommandStatus::Delivered),
            "SUCCESS" => Ok(CommandStatus::Success),
            "FAILED" => Ok(CommandStatus::Failed),
            _ => Err(UnknownVariant {
                kind: "command status",
                value: s.to_string(),
            }),
        }
    }
}
