use std::fmt;

use serde::{Deserialize, Serialize};

/// Estado de una ejecución de job o de step.
///
/// ```text
/// STARTING -> STARTED -> COMPLETED | FAILED
///                 \-> STOPPING -> STOPPED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
    Completed,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Completed)
    }

    /// Estados en los que `stop()` tiene efecto.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::Stopping)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_batch_names() {
        assert_eq!(BatchStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(serde_json::to_value(BatchStatus::Stopping).unwrap(), serde_json::json!("STOPPING"));
    }

    #[test]
    fn running_and_terminal_are_disjoint() {
        for s in [BatchStatus::Starting,
                  BatchStatus::Started,
                  BatchStatus::Stopping,
                  BatchStatus::Stopped,
                  BatchStatus::Failed,
                  BatchStatus::Completed]
        {
            assert!(!(s.is_running() && s.is_terminal()), "{s}");
        }
    }
}
