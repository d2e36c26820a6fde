use std::{fmt, str::FromStr};

use super::error::{AgentError, AgentResult};

/// Canonical lifecycle states a request can be in.
///
/// Status text coming from the store is only trusted after it has been
/// mapped onto one of these members with [`normalize`]. Matching is exact
/// and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestLifecycleToken {
    Build,
    Building,
    Built,
    Create,
    Creating,
    Created,
    Stateup,
    Statedown,
    Delete,
    Deleting,
    Deleted,
    Error,
    Start,
    Starting,
    Started,
    Stop,
    Stoping,
    Stopped,
}

impl RequestLifecycleToken {
    /// Every recognized token, in vocabulary order.
    pub const ALL: [RequestLifecycleToken; 18] = [
        RequestLifecycleToken::Build,
        RequestLifecycleToken::Building,
        RequestLifecycleToken::Built,
        RequestLifecycleToken::Create,
        RequestLifecycleToken::Creating,
        RequestLifecycleToken::Created,
        RequestLifecycleToken::Stateup,
        RequestLifecycleToken::Statedown,
        RequestLifecycleToken::Delete,
        RequestLifecycleToken::Deleting,
        RequestLifecycleToken::Deleted,
        RequestLifecycleToken::Error,
        RequestLifecycleToken::Start,
        RequestLifecycleToken::Starting,
        RequestLifecycleToken::Started,
        RequestLifecycleToken::Stop,
        RequestLifecycleToken::Stoping,
        RequestLifecycleToken::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestLifecycleToken::Build => "build",
            RequestLifecycleToken::Building => "building",
            RequestLifecycleToken::Built => "built",
            RequestLifecycleToken::Create => "create",
            RequestLifecycleToken::Creating => "creating",
            RequestLifecycleToken::Created => "created",
            RequestLifecycleToken::Stateup => "stateup",
            RequestLifecycleToken::Statedown => "statedown",
            RequestLifecycleToken::Delete => "delete",
            RequestLifecycleToken::Deleting => "deleting",
            RequestLifecycleToken::Deleted => "deleted",
            RequestLifecycleToken::Error => "error",
            RequestLifecycleToken::Start => "start",
            RequestLifecycleToken::Starting => "starting",
            RequestLifecycleToken::Started => "started",
            RequestLifecycleToken::Stop => "stop",
            RequestLifecycleToken::Stoping => "stoping",
            RequestLifecycleToken::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RequestLifecycleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestLifecycleToken {
    type Err = AgentError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|token| token.as_str() == raw)
            .ok_or_else(|| AgentError::InvalidRequestType(raw.to_string()))
    }
}

/// Map free-text status onto the lifecycle vocabulary.
pub fn normalize(raw: &str) -> AgentResult<RequestLifecycleToken> {
    raw.parse()
}
