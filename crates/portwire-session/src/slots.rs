use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;

/// A reply taken from the slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotHit {
    Response(Bytes),
    Interrupt(Bytes),
}

struct Slot {
    seq: u64,
    received: Instant,
    data: Bytes,
}

#[derive(Default)]
struct SlotState {
    next_seq: u64,
    response: Option<Slot>,
    interrupt: Option<Slot>,
}

impl SlotState {
    fn stamp(&mut self, data: Bytes) -> Slot {
        self.next_seq += 1;
        Slot {
            seq: self.next_seq,
            received: Instant::now(),
            data,
        }
    }
}

/// Single-entry holders for the most recent response and interrupt.
///
/// Each store overwrites the previous value. Entries carry an arrival
/// sequence number so a waiting sender can tell which came first.
#[derive(Default)]
pub struct ReplySlots {
    state: Mutex<SlotState>,
}

impl ReplySlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrite the last-response slot.
    pub fn store_response(&self, data: Bytes) {
        let mut state = self.lock();
        state.response = Some(state.stamp(data));
    }

    /// Overwrite the last-interrupt slot.
    pub fn store_interrupt(&self, data: Bytes) {
        let mut state = self.lock();
        state.interrupt = Some(state.stamp(data));
    }

    /// Empty both slots.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.response = None;
        state.interrupt = None;
    }

    /// Peek at the last response.
    pub fn last_response(&self) -> Option<Bytes> {
        self.lock().response.as_ref().map(|slot| slot.data.clone())
    }

    /// Peek at the last interrupt.
    pub fn last_interrupt(&self) -> Option<Bytes> {
        self.lock().interrupt.as_ref().map(|slot| slot.data.clone())
    }

    /// When the interrupt currently held was stored.
    pub fn interrupt_received(&self) -> Option<Instant> {
        self.lock().interrupt.as_ref().map(|slot| slot.received)
    }

    /// Take whichever of an accepted response and an interrupt arrived first.
    ///
    /// A response that `accept` rejects stays in its slot and is ignored.
    pub fn take_reply(&self, accept: impl Fn(&[u8]) -> bool) -> Option<SlotHit> {
        let mut state = self.lock();
        let response_seq = state
            .response
            .as_ref()
            .filter(|slot| accept(&slot.data))
            .map(|slot| slot.seq);
        let interrupt_seq = state.interrupt.as_ref().map(|slot| slot.seq);

        match (response_seq, interrupt_seq) {
            (Some(resp), Some(intr)) if intr < resp => {
                state.interrupt.take().map(|slot| SlotHit::Interrupt(slot.data))
            }
            (Some(_), _) => state.response.take().map(|slot| SlotHit::Response(slot.data)),
            (None, Some(_)) => state.interrupt.take().map(|slot| SlotHit::Interrupt(slot.data)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_overwrites() {
        let slots = ReplySlots::new();
        slots.store_response(Bytes::from_static(b"one"));
        slots.store_response(Bytes::from_static(b"two"));
        assert_eq!(slots.last_response().unwrap().as_ref(), b"two");
    }

    #[test]
    fn earlier_arrival_wins() {
        let slots = ReplySlots::new();
        slots.store_interrupt(Bytes::from_static(b"irq"));
        slots.store_response(Bytes::from_static(b"resp"));

        assert_eq!(
            slots.take_reply(|_| true),
            Some(SlotHit::Interrupt(Bytes::from_static(b"irq")))
        );
        assert_eq!(
            slots.take_reply(|_| true),
            Some(SlotHit::Response(Bytes::from_static(b"resp")))
        );
        assert_eq!(slots.take_reply(|_| true), None);
    }

    #[test]
    fn response_before_interrupt_is_delivered() {
        let slots = ReplySlots::new();
        slots.store_response(Bytes::from_static(b"resp"));
        slots.store_interrupt(Bytes::from_static(b"irq"));

        assert_eq!(
            slots.take_reply(|_| true),
            Some(SlotHit::Response(Bytes::from_static(b"resp")))
        );
        assert!(slots.last_interrupt().is_some());
    }

    #[test]
    fn rejected_response_is_left_alone() {
        let slots = ReplySlots::new();
        slots.store_response(Bytes::from_static(b"other"));

        assert_eq!(slots.take_reply(|data| data == b"mine"), None);
        assert!(slots.last_response().is_some());

        slots.clear();
        assert!(slots.last_response().is_none());
    }
}
