use crate::h3::consts::DEFAULT_MAX_FIELD_SECTION_SIZE;
use crate::utils::USER_AGENT;
use std::time::Duration;

/// Connection-wide options shared by clients and servers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnConfig {
    pub timeouts: ClientTimeouts,
    /// Largest field section accepted from the peer, also announced in SETTINGS.
    pub max_field_section_size: u64,
    /// Sent when a request carries no `user-agent` of its own.
    pub user_agent: String,
    /// Verify server certificates against the webpki roots when dialing.
    pub verify_certificates: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            timeouts: ClientTimeouts::default(),
            max_field_section_size: DEFAULT_MAX_FIELD_SECTION_SIZE,
            user_agent: USER_AGENT.to_string(),
            verify_certificates: false,
        }
    }
}

impl ConnConfig {
    pub fn timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_field_section_size(mut self, size: u64) -> Self {
        self.max_field_section_size = size;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }
}

/// Per-operation limits, each optional. `connect` bounds dialing and opening
/// a request stream; `read` and `write` bound every single stream operation
/// of a round trip, not the exchange as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientTimeouts {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read: Some(Duration::from_secs(30)),
            write: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientTimeouts {
    pub fn disabled() -> Self {
        Self {
            connect: None,
            read: None,
            write: None,
        }
    }

    pub fn connect(mut self, limit: Duration) -> Self {
        self.connect = Some(limit);
        self
    }

    pub fn read(mut self, limit: Duration) -> Self {
        self.read = Some(limit);
        self
    }

    pub fn write(mut self, limit: Duration) -> Self {
        self.write = Some(limit);
        self
    }
}
