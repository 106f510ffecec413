//! Request lifecycle phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of one `send` call.
///
/// Phases advance `Prepare → Pending → Resolved`; `Rejected` can follow
/// any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Before validation; interceptors may still rewrite data and options.
    Prepare,
    /// The request is validated and about to be handed to the fetcher.
    Pending,
    /// The response passed validation.
    Resolved,
    /// Some phase failed.
    Rejected,
}

impl RequestStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Prepare, Self::Pending, Self::Resolved, Self::Rejected];

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
