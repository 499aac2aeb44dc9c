//! Credit-controlled bridge from the block producer to the transport.
use std::collections::VecDeque;

use log::{debug, trace};

use crate::{ClientError, protocol::Block};

use super::flow::{FlowError, Subscription};

/// Blocks requested ahead of the transport.
pub const PREFETCH: usize = 16;

/// Outcome of handing a block to a [`BlockSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// On the wire; confirmed immediately.
    Sent,
    /// Accepted; confirmed later through
    /// [`BlockTransmitter::on_write_confirmed`].
    Pending,
}

/// Write side of the transport as seen by the transmitter.
pub trait BlockSink {
    fn is_writable(&self) -> bool;
    fn write(&mut self, block: Block) -> Result<WriteStatus, ClientError>;
    fn flush(&mut self) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterState {
    Idle,
    Active,
    Draining,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    rows: usize,
    sentinel: bool,
}

pub struct BlockTransmitter {
    state: TransmitterState,
    subscription: Option<Box<dyn Subscription>>,
    queue: VecDeque<Block>,
    in_flight: VecDeque<InFlight>,
    outstanding: usize,
    rows_sent: u64,
    blocks_sent: u64,
}

impl Default for BlockTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTransmitter {
    pub fn new() -> Self {
        Self {
            state: TransmitterState::Idle,
            subscription: None,
            queue: VecDeque::with_capacity(PREFETCH),
            in_flight: VecDeque::with_capacity(PREFETCH),
            outstanding: 0,
            rows_sent: 0,
            blocks_sent: 0,
        }
    }

    pub fn state(&self) -> TransmitterState {
        self.state
    }

    /// Blocks requested upstream and not yet received.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Rows in data blocks confirmed written.
    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    /// Data blocks confirmed written, sentinel excluded.
    pub fn blocks_sent(&self) -> u64 {
        self.blocks_sent
    }

    pub fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) -> Result<(), ClientError> {
        if self.state != TransmitterState::Idle {
            subscription.cancel();
            return Err(FlowError::DuplicateSubscription.into());
        }
        self.state = TransmitterState::Active;
        self.outstanding = PREFETCH;
        subscription.request(PREFETCH as u64);
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Takes one block from upstream. Sends it at once when the sink is
    /// writable and nothing is queued ahead of it, otherwise queues it.
    pub fn on_next<S: BlockSink>(&mut self, block: Block, sink: &mut S) -> Result<(), ClientError> {
        if !block.is_empty() {
            self.outstanding = self.outstanding.checked_sub(1).ok_or(FlowError::CreditExhausted)?;
        }
        if self.queue.len() + self.in_flight.len() >= PREFETCH + 1 {
            return Err(FlowError::Overgrowth {
                outstanding: self.queue.len() + self.in_flight.len() + 1,
                prefetch: PREFETCH,
            }
            .into());
        }
        self.queue.push_back(block);
        if sink.is_writable() {
            self.drain(sink)?;
        } else {
            trace!("sink not writable, {} blocks queued", self.queue.len());
        }
        Ok(())
    }

    /// A block handed to the sink has reached the wire. Data blocks give their
    /// credit back and one more block is requested.
    pub fn on_write_confirmed(&mut self) {
        let Some(done) = self.in_flight.pop_front() else {
            return;
        };
        if done.sentinel {
            return;
        }
        self.rows_sent += done.rows as u64;
        self.blocks_sent += 1;
        if self.state == TransmitterState::Active {
            if let Some(subscription) = &self.subscription {
                self.outstanding += 1;
                subscription.request(1);
            }
        }
    }

    pub fn on_writability_changed<S: BlockSink>(&mut self, writable: bool, sink: &mut S) -> Result<(), ClientError> {
        if writable {
            self.drain(sink)?;
        }
        Ok(())
    }

    /// Upstream is done. Whatever is still queued goes out as soon as the
    /// sink allows.
    pub fn on_complete<S: BlockSink>(&mut self, sink: &mut S) -> Result<(), ClientError> {
        self.state = TransmitterState::Draining;
        self.subscription = None;
        self.drain(sink)
    }

    /// Upstream finished and every block has been confirmed.
    pub fn is_finished(&self) -> bool {
        self.state == TransmitterState::Draining && self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Stops the stream: upstream is cancelled and every queued block is
    /// dropped. Safe to call more than once.
    pub fn cancel(&mut self) {
        if self.state == TransmitterState::Failed {
            return;
        }
        self.state = TransmitterState::Failed;
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if !self.queue.is_empty() {
            debug!("dropping {} queued blocks", self.queue.len());
        }
        self.queue.clear();
        self.in_flight.clear();
        self.outstanding = 0;
    }

    /// Writes queued blocks until the queue empties or the sink stops being
    /// writable, then flushes once.
    fn drain<S: BlockSink>(&mut self, sink: &mut S) -> Result<(), ClientError> {
        let mut sent = false;
        while sink.is_writable() {
            let Some(block) = self.queue.pop_front() else {
                break;
            };
            if let Err(e) = self.send(block, sink) {
                self.cancel();
                return Err(e);
            }
            sent = true;
        }
        if sent {
            if let Err(e) = sink.flush() {
                self.cancel();
                return Err(e);
            }
        }
        Ok(())
    }

    fn send<S: BlockSink>(&mut self, block: Block, sink: &mut S) -> Result<(), ClientError> {
        let entry = InFlight {
            rows: block.rows(),
            sentinel: block.is_empty(),
        };
        trace!("sending block of {} rows", entry.rows);
        let status = sink.write(block)?;
        self.in_flight.push_back(entry);
        if status == WriteStatus::Sent {
            self.on_write_confirmed();
        }
        Ok(())
    }
}
