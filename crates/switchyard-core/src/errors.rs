/// Failures when an engine pushes a message to its client.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// The outbound queue is full; the message was dropped.
    #[error("outbound queue full")]
    Backpressure,
    /// The channel that owned this peer has been closed.
    #[error("peer disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings() {
        assert_eq!(PeerError::Backpressure.to_string(), "outbound queue full");
        assert_eq!(PeerError::Disconnected.to_string(), "peer disconnected");
    }
}
