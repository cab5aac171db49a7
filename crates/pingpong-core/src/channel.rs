// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ball channel: one queue per edge, multiplexed by direction tag.

use crate::ball::{Ball, Direction};
use crate::error::ChannelError;
use crate::registry::ChannelAddress;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

struct ChannelInner {
    queue: VecDeque<Ball>,
    capacity: usize,
    closed: bool,
}

/// Multi-producer, multi-consumer ball queue with tag-selective receive.
///
/// Cloning yields another handle to the same queue. Sends never wait for a
/// receiver; receives never block.
#[derive(Clone)]
pub struct BallChannel {
    address: ChannelAddress,
    inner: Arc<Mutex<ChannelInner>>,
}

impl BallChannel {
    pub(crate) fn new(address: ChannelAddress, capacity: usize) -> Self {
        Self {
            address,
            inner: Arc::new(Mutex::new(ChannelInner {
                queue: VecDeque::new(),
                capacity,
                closed: false,
            })),
        }
    }

    /// Address this channel was opened at.
    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    /// Enqueue `ball` under its own direction tag.
    pub fn send(&self, ball: Ball) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(ChannelError::Closed(self.address));
        }
        if inner.queue.len() >= inner.capacity {
            return Err(ChannelError::Full {
                address: self.address,
                capacity: inner.capacity,
            });
        }
        inner.queue.push_back(ball);
        Ok(())
    }

    /// Dequeue the oldest ball tagged `direction`.
    ///
    /// `Ok(None)` means nothing with that tag is queued; balls of the other
    /// tag are left in place.
    pub fn try_receive(&self, direction: Direction) -> Result<Option<Ball>, ChannelError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(ChannelError::Closed(self.address));
        }
        let position = inner
            .queue
            .iter()
            .position(|ball| ball.direction == direction);
        Ok(position.and_then(|idx| inner.queue.remove(idx)))
    }

    /// Number of queued balls across both tags.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued balls with the given tag.
    pub fn pending(&self, direction: Direction) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .iter()
            .filter(|ball| ball.direction == direction)
            .count()
    }

    /// Whether the channel was closed.
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.closed = true;
        inner.queue.clear();
    }
}

impl fmt::Debug for BallChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BallChannel")
            .field("address", &self.address)
            .field("queued", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::ParticipantId;
    use crate::registry::resolve;

    fn channel(capacity: usize) -> BallChannel {
        BallChannel::new(resolve("./pingpong", 1).unwrap(), capacity)
    }

    #[test]
    fn receive_is_selective_by_tag() {
        let ch = channel(8);
        ch.send(Ball::backward(ParticipantId::new(1))).unwrap();
        ch.send(Ball::forward(ParticipantId::new(2))).unwrap();

        let fwd = ch.try_receive(Direction::Forward).unwrap().unwrap();
        assert_eq!(fwd.direction, Direction::Forward);
        assert_eq!(ch.try_receive(Direction::Forward).unwrap(), None);
        assert_eq!(ch.pending(Direction::Backward), 1);

        let back = ch.try_receive(Direction::Backward).unwrap().unwrap();
        assert_eq!(back.target, ParticipantId::new(1));
        assert!(ch.is_empty());
    }

    #[test]
    fn same_tag_is_fifo() {
        let ch = channel(8);
        for id in 1..=3 {
            ch.send(Ball::forward(ParticipantId::new(id))).unwrap();
        }
        let order: Vec<u32> = std::iter::from_fn(|| ch.try_receive(Direction::Forward).unwrap())
            .map(|b| b.target.get())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn empty_channel_yields_none() {
        let ch = channel(1);
        assert_eq!(ch.try_receive(Direction::Backward).unwrap(), None);
    }

    #[test]
    fn send_fails_at_capacity() {
        let ch = channel(1);
        ch.send(Ball::forward(ParticipantId::new(1))).unwrap();
        assert!(matches!(
            ch.send(Ball::forward(ParticipantId::new(1))),
            Err(ChannelError::Full { capacity: 1, .. })
        ));
    }

    #[test]
    fn closed_channel_rejects_both_ends() {
        let ch = channel(4);
        ch.send(Ball::forward(ParticipantId::new(1))).unwrap();
        ch.close();
        assert!(ch.is_closed());
        assert!(ch.is_empty());
        assert!(matches!(
            ch.try_receive(Direction::Forward),
            Err(ChannelError::Closed(_))
        ));
    }
}
