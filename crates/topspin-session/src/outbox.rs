//! Outgoing gameplay messages.
//!
//! Gameplay components never touch the network. They push what they want
//! sent into an [`Outbox`], and the client runtime flushes it to the relay
//! once per frame (and after every handled event).

use topspin_protocol::{Channel, GameMessage, Recipient};

/// One message waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: Recipient,
    pub channel: Channel,
    pub message: GameMessage,
}

/// FIFO of outgoing messages.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message on a specific channel.
    pub fn send(&mut self, to: Recipient, channel: Channel, message: GameMessage) {
        self.queue.push(Outgoing {
            to,
            channel,
            message,
        });
    }

    /// Queues a message on the reliable, ordered channel.
    pub fn reliable(&mut self, to: Recipient, message: GameMessage) {
        self.send(to, Channel::ReliableOrdered, message);
    }

    /// Queues a message on the unreliable channel.
    pub fn unreliable(&mut self, to: Recipient, message: GameMessage) {
        self.send(to, Channel::Unreliable, message);
    }

    /// Takes every queued message in send order.
    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Outgoing> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use topspin_protocol::ParticipantId;

    use super::*;

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut outbox = Outbox::new();
        outbox.reliable(
            Recipient::Authority,
            GameMessage::SpawnRequest {
                requesting: ParticipantId(1),
            },
        );
        outbox.unreliable(
            Recipient::All,
            GameMessage::ScoreUpdate {
                participant: ParticipantId(1),
                score: 3,
            },
        );

        let sent = outbox.drain();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].channel, Channel::ReliableOrdered);
        assert_eq!(sent[1].channel, Channel::Unreliable);
        assert!(outbox.is_empty());
    }
}
