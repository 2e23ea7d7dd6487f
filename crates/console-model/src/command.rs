//! Lifecycle commands

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Command the deployment tool is running
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Build the deployment artifact
    Package,
    /// Package (unless prebuilt) and deploy the whole service
    Deploy,
    /// Redeploy a single unit
    DeployFunction,
    /// Roll back to a previously deployed artifact
    Rollback,
    /// Tear the service down
    Remove,
    /// Any other command (`print`, `info`, ...)
    Other(String),
}

impl Command {
    /// Whether the console integration takes part in this command
    #[inline]
    #[must_use]
    pub fn supports_console(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(match normalized.as_str() {
            "package" => Self::Package,
            "deploy" => Self::Deploy,
            "deploy function" => Self::DeployFunction,
            "rollback" => Self::Rollback,
            "remove" => Self::Remove,
            _ => Self::Other(normalized),
        })
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package => f.write_str("package"),
            Self::Deploy => f.write_str("deploy"),
            Self::DeployFunction => f.write_str("deploy function"),
            Self::Rollback => f.write_str("rollback"),
            Self::Remove => f.write_str("remove"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Which way a consistency check looks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Deploying a (possibly prebuilt) artifact forward
    Deploy,
    /// Returning to an earlier artifact
    Rollback,
}
