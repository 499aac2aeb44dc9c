use thiserror::Error;

use crate::ClientError;

use super::assembler::AssemblerState;

/// Demand side of a producer/consumer pair.
///
/// `request(n)` grants the producer permission to emit `n` more items;
/// `cancel()` stops it and releases whatever it still holds.
pub trait Subscription: Send {
    fn request(&self, n: u64);
    fn cancel(&self);
}

/// What a producer emits downstream. `Complete` and `Error` are terminal.
#[derive(Debug)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(ClientError),
}

/// What a consumer sends upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    Request(u64),
    Cancel,
}

/// Misuse of the credit protocol. These are programming errors and are never
/// recovered from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("demand of {requested} in state {state:?}")]
    InvalidDemand { state: AssemblerState, requested: u64 },
    #[error("subscribe in state {state:?}")]
    AlreadySubscribed { state: AssemblerState },
    #[error("transmitter subscribed twice")]
    DuplicateSubscription,
    #[error("row delivered in state {state:?}")]
    NotActive { state: AssemblerState },
    #[error("row delivered without credit")]
    CreditExhausted,
    #[error("{outstanding} blocks outstanding exceeds prefetch of {prefetch}")]
    Overgrowth { outstanding: usize, prefetch: usize },
}
