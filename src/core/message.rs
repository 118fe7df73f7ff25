use std::fmt;

/// A payload pushed by the backing store on a listened channel.
///
/// Carries no identity beyond its content and arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    channel: String,
    payload: String,
    process_id: Option<u32>,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            process_id: None,
        }
    }

    /// Attach the id of the server process that issued the NOTIFY.
    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = Some(process_id);
        self
    }

    #[inline]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[inline]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    #[inline]
    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.channel, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_channel_and_payload() {
        let n = Notification::new("orders", "created:42").with_process_id(7);
        assert_eq!(n.to_string(), "[orders] created:42");
        assert_eq!(n.process_id(), Some(7));
        assert_eq!(n.into_payload(), "created:42");
    }
}
