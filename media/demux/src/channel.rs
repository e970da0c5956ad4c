/*!
    Bounded packet channels between the demuxer pump and its consumers.

    The sender never blocks and never drops: [`PacketSender::offer`] hands a
    refused packet back, and the pump waits on
    [`PacketSender::wait_capacity`] before offering again. Every pop signals
    the drain notification, so a full channel wakes the pump as soon as its
    consumer takes one packet.
*/

use std::collections::VecDeque;
use std::sync::Arc;

use media_types::Packet;
use parking_lot::Mutex;
use tokio::sync::Notify;

/**
    How a packet sequence ended.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The container ended cleanly.
    Finished,
    /// Reading or filtering failed; packets up to the failure were delivered.
    Failed(String),
}

/**
    Result of [`PacketSender::offer`].
*/
#[derive(Debug)]
pub enum Offer {
    Accepted,
    /// The channel is at capacity; the packet is handed back.
    Full(Packet),
    /// The receiver is gone or the channel was closed; the packet was dropped.
    Disconnected,
}

struct ChannelState {
    packets: VecDeque<Packet>,
    end: Option<StreamEnd>,
    receiver_alive: bool,
}

struct Shared {
    state: Mutex<ChannelState>,
    capacity: usize,
    /// Wakes the receiver.
    available: Notify,
    /// Wakes the sender after a pop or when the receiver goes away.
    drained: Notify,
}

/**
    Create a channel holding at most `capacity` packets.
*/
pub fn packet_channel(capacity: usize) -> (PacketSender, PacketReceiver) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            packets: VecDeque::with_capacity(capacity),
            end: None,
            receiver_alive: true,
        }),
        capacity,
        available: Notify::new(),
        drained: Notify::new(),
    });
    (
        PacketSender {
            shared: Arc::clone(&shared),
        },
        PacketReceiver { shared },
    )
}

/**
    Producing half, owned by the pump.

    Dropping it without [`close`](Self::close) ends the sequence with a
    failure.
*/
pub struct PacketSender {
    shared: Arc<Shared>,
}

impl PacketSender {
    pub fn offer(&self, packet: Packet) -> Offer {
        let mut state = self.shared.state.lock();
        if !state.receiver_alive || state.end.is_some() {
            return Offer::Disconnected;
        }
        if state.packets.len() >= self.shared.capacity {
            return Offer::Full(packet);
        }
        state.packets.push_back(packet);
        drop(state);
        self.shared.available.notify_one();
        Offer::Accepted
    }

    pub fn has_capacity(&self) -> bool {
        self.shared.state.lock().packets.len() < self.shared.capacity
    }

    pub fn is_disconnected(&self) -> bool {
        !self.shared.state.lock().receiver_alive
    }

    /**
        Wait until the channel has room or the receiver is gone.
    */
    pub async fn wait_capacity(&self) {
        loop {
            {
                let state = self.shared.state.lock();
                if !state.receiver_alive || state.packets.len() < self.shared.capacity {
                    return;
                }
            }
            self.shared.drained.notified().await;
        }
    }

    /**
        Wait until the receiver has been dropped.
    */
    pub async fn closed(&self) {
        loop {
            if self.is_disconnected() {
                return;
            }
            self.shared.drained.notified().await;
        }
    }

    /**
        Mark the end of the sequence. Packets already queued are still
        delivered. Only the first call has an effect.
    */
    pub fn close(&self, end: StreamEnd) {
        let mut state = self.shared.state.lock();
        if state.end.is_none() {
            state.end = Some(end);
        }
        drop(state);
        self.shared.available.notify_one();
    }
}

impl Drop for PacketSender {
    fn drop(&mut self) {
        self.close(StreamEnd::Failed("demuxer stopped before the end of stream".into()));
    }
}

/**
    Consuming half of a packet sequence.
*/
pub struct PacketReceiver {
    shared: Arc<Shared>,
}

impl PacketReceiver {
    /**
        Receive the next packet, or `None` once the sequence has ended and
        every queued packet was taken.
    */
    pub async fn recv(&mut self) -> Option<Packet> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(packet) = state.packets.pop_front() {
                    drop(state);
                    self.shared.drained.notify_one();
                    return Some(packet);
                }
                if state.end.is_some() {
                    return None;
                }
            }
            self.shared.available.notified().await;
        }
    }

    /**
        How the sequence ended, once it has.
    */
    pub fn end(&self) -> Option<StreamEnd> {
        self.shared.state.lock().end.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Drop for PacketReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.receiver_alive = false;
        state.packets.clear();
        drop(state);
        self.shared.drained.notify_one();
    }
}

impl std::fmt::Debug for PacketReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketReceiver")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("end", &self.end())
            .finish()
    }
}
