use tally_api::RemoteVersionToken;

/// Last version token this process proved the remote file to have.
///
/// Updated after every successful read or write; it means nothing on its own,
/// only as the expected value for the next conflict check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionTracker {
    last_seen: Option<RemoteVersionToken>,
}

impl RevisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: RemoteVersionToken) -> Self {
        Self {
            last_seen: Some(token),
        }
    }

    pub fn observe(&mut self, token: RemoteVersionToken) {
        self.last_seen = Some(token);
    }

    pub fn current(&self) -> Option<&RemoteVersionToken> {
        self.last_seen.as_ref()
    }

    /// True when `remote` equals the tracked token, or when nothing is tracked yet
    pub fn matches(&self, remote: &RemoteVersionToken) -> bool {
        self.last_seen.as_ref().is_none_or(|seen| seen == remote)
    }
}
