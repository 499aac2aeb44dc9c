//! Runs a [`BlockAssembler`] over a [`RowSource`] on its own thread.
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread,
};

use log::{debug, trace, warn};

use crate::{ClientError, protocol::Block};

use super::{
    assembler::BlockAssembler,
    flow::{Demand, Signal, Subscription},
    source::RowSource,
};

/// Handle the consumer uses to drive a producer thread.
#[derive(Debug)]
pub struct ProducerSubscription {
    demand: Sender<Demand>,
}

impl Subscription for ProducerSubscription {
    fn request(&self, n: u64) {
        // The producer is gone once it has completed; late demand is moot.
        let _ = self.demand.send(Demand::Request(n));
    }

    fn cancel(&self) {
        let _ = self.demand.send(Demand::Cancel);
    }
}

/// Starts pulling rows from `source` as demand arrives, posting every
/// emitted block and the terminal signal to `events`.
///
/// The thread is detached. It ends on completion, on error, on cancel, or
/// when either channel is disconnected. A panic in the source or the assembler
/// is reported as a [`Signal::Error`] carrying [`ClientError::Source`].
pub fn spawn_producer<S, E>(assembler: BlockAssembler, source: S, events: Sender<E>) -> ProducerSubscription
where
    S: RowSource,
    E: From<Signal<Block>> + Send + 'static,
{
    let (demand, demand_rx) = mpsc::channel();
    thread::spawn(move || {
        let producer = Producer {
            assembler,
            source,
            demand: demand_rx,
            events: events.clone(),
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| producer.run())) {
            let reason = panic_reason(payload.as_ref());
            warn!("row producer panicked: {reason}");
            let error = ClientError::Source(format!("row source panicked: {reason}"));
            let _ = events.send(Signal::Error(error).into());
        }
    });
    ProducerSubscription { demand }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason
    } else {
        "unknown cause"
    }
}

struct Producer<S, E> {
    assembler: BlockAssembler,
    source: S,
    demand: Receiver<Demand>,
    events: Sender<E>,
}

impl<S, E> Producer<S, E>
where
    S: RowSource,
    E: From<Signal<Block>> + Send + 'static,
{
    fn run(mut self) {
        if let Err(e) = self.assembler.subscribe() {
            self.emit(Signal::Error(e.into()));
            return;
        }

        loop {
            if self.assembler.row_credit() == 0 {
                match self.demand.recv() {
                    Ok(demand) => {
                        if !self.apply(demand) {
                            return;
                        }
                    }
                    Err(_) => return self.abort("consumer went away"),
                }
            }
            loop {
                match self.demand.try_recv() {
                    Ok(demand) => {
                        if !self.apply(demand) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return self.abort("consumer went away"),
                }
            }

            match self.source.next_row() {
                Some(Ok(row)) => match self.assembler.on_next(row) {
                    Ok(Some(block)) => {
                        trace!("assembled block of {} rows", block.rows());
                        if !self.emit(Signal::Next(block)) {
                            return self.abort("consumer went away");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.assembler.on_error();
                        self.source.cancel();
                        self.emit(Signal::Error(e));
                        return;
                    }
                },
                Some(Err(e)) => {
                    self.assembler.on_error();
                    self.emit(Signal::Error(e));
                    return;
                }
                None => {
                    match self.assembler.on_complete() {
                        Ok(blocks) => {
                            for block in blocks {
                                if !self.emit(Signal::Next(block)) {
                                    return;
                                }
                            }
                            self.emit(Signal::Complete);
                        }
                        Err(e) => {
                            self.emit(Signal::Error(e.into()));
                        }
                    }
                    debug!("row source exhausted");
                    return;
                }
            }
        }
    }

    /// Returns false when the producer must stop.
    fn apply(&mut self, demand: Demand) -> bool {
        match demand {
            Demand::Request(n) => match self.assembler.request(n) {
                Ok(rows) => {
                    trace!("granted {n} blocks ({rows} rows)");
                    true
                }
                Err(e) => {
                    self.assembler.on_error();
                    self.source.cancel();
                    self.emit(Signal::Error(e.into()));
                    false
                }
            },
            Demand::Cancel => {
                self.abort("cancelled");
                false
            }
        }
    }

    fn abort(&mut self, reason: &str) {
        debug!("producer stopping: {reason}");
        self.assembler.cancel();
        self.source.cancel();
    }

    fn emit(&self, signal: Signal<Block>) -> bool {
        self.events.send(signal.into()).is_ok()
    }
}
