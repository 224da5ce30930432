//! Pending-packet queue between the demux engine and the consumer loop.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::packet::Packet;

/// Thread-safe, unbounded FIFO of classified packets.
///
/// Producers are the engine's internal worker thread(s); the single primary
/// consumer is the owning session's receive loop. Insertion order is
/// processing order - no reordering, no priority. `offer` and `poll` never
/// block beyond the internal lock, and `drain` removes everything atomically
/// with respect to concurrent producers.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: Mutex<VecDeque<Packet>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet; O(1), never fails.
    pub fn offer(&self, packet: Packet) {
        self.packets.lock().unwrap().push_back(packet);
    }

    /// Remove and return the head, or `None` if empty. Never waits.
    pub fn poll(&self) -> Option<Packet> {
        self.packets.lock().unwrap().pop_front()
    }

    /// Destructive: capture and remove all queued packets in FIFO order.
    ///
    /// Shutdown path only - used after the engine is destroyed so buffered
    /// output between "stop receiving" and "engine flushed" is not lost.
    pub fn drain(&self) -> Vec<Packet> {
        let mut packets = self.packets.lock().unwrap();
        packets.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().unwrap().is_empty()
    }
}
