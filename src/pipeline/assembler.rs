//! Row-to-block batching.
use std::mem;

use log::debug;

use crate::{
    ClientError,
    protocol::{Block, BlockInfo, CodecError, Column, Row, Schema},
};

use super::flow::FlowError;

/// Rows per full block.
pub const BLOCK_ROWS: usize = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Unsubscribed,
    Active,
    Completed,
    Errored,
    Cancelled,
}

/// Accumulates rows into column buffers and cuts a [`Block`] every
/// `threshold` rows.
///
/// Demand is counted in blocks downstream and in rows upstream: a request for
/// `n` blocks grants `n * threshold` rows of credit.
#[derive(Debug)]
pub struct BlockAssembler {
    schema: Schema,
    threshold: usize,
    state: AssemblerState,
    columns: Vec<Column>,
    rows: usize,
    row_credit: u64,
    released: bool,
}

impl BlockAssembler {
    pub fn new(schema: Schema) -> Self {
        Self::with_threshold(schema, BLOCK_ROWS)
    }

    /// # Panics
    /// If `threshold` is zero.
    pub fn with_threshold(schema: Schema, threshold: usize) -> Self {
        assert!(threshold > 0);
        let columns = fresh_columns(&schema, threshold);
        Self {
            schema,
            threshold,
            state: AssemblerState::Unsubscribed,
            columns,
            rows: 0,
            row_credit: 0,
            released: false,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn row_credit(&self) -> u64 {
        self.row_credit
    }

    pub fn pending_rows(&self) -> usize {
        self.rows
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn subscribe(&mut self) -> Result<(), FlowError> {
        if self.state != AssemblerState::Unsubscribed {
            return Err(FlowError::AlreadySubscribed { state: self.state });
        }
        self.state = AssemblerState::Active;
        Ok(())
    }

    /// Grants credit for `blocks` more blocks and returns the matching number
    /// of rows to pull from upstream.
    pub fn request(&mut self, blocks: u64) -> Result<u64, FlowError> {
        if self.state != AssemblerState::Active || blocks == 0 {
            return Err(FlowError::InvalidDemand {
                state: self.state,
                requested: blocks,
            });
        }
        let rows = blocks.saturating_mul(self.threshold as u64);
        self.row_credit = self.row_credit.saturating_add(rows);
        Ok(rows)
    }

    /// Appends one row, returning a full block once the threshold is reached.
    pub fn on_next(&mut self, row: Row) -> Result<Option<Block>, ClientError> {
        if self.state != AssemblerState::Active {
            return Err(FlowError::NotActive { state: self.state }.into());
        }
        if self.row_credit == 0 {
            return Err(FlowError::CreditExhausted.into());
        }
        if row.len() != self.columns.len() {
            return Err(CodecError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            }
            .into());
        }

        for (column, value) in self.columns.iter_mut().zip(&row) {
            column.push(value)?;
        }
        self.rows += 1;
        self.row_credit -= 1;

        if self.rows == self.threshold {
            return Ok(Some(self.take_block()));
        }
        Ok(None)
    }

    /// Ends the stream: the pending partial block, if any, then the empty
    /// sentinel.
    pub fn on_complete(&mut self) -> Result<Vec<Block>, FlowError> {
        if self.state != AssemblerState::Active {
            return Err(FlowError::NotActive { state: self.state });
        }
        self.state = AssemblerState::Completed;

        let mut blocks = Vec::with_capacity(2);
        if self.rows > 0 {
            blocks.push(self.take_block());
        }
        blocks.push(Block::empty());
        self.release();
        Ok(blocks)
    }

    pub fn on_error(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = AssemblerState::Errored;
        self.release();
    }

    pub fn cancel(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = AssemblerState::Cancelled;
        self.release();
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            AssemblerState::Completed | AssemblerState::Errored | AssemblerState::Cancelled
        )
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!("assembler released {} pending rows in state {:?}", self.rows, self.state);
        self.columns = Vec::new();
        self.rows = 0;
        self.row_credit = 0;
    }

    fn take_block(&mut self) -> Block {
        let columns = mem::replace(&mut self.columns, fresh_columns(&self.schema, self.threshold));
        let rows = mem::take(&mut self.rows);
        Block::new(BlockInfo::default(), columns, rows)
    }
}

fn fresh_columns(schema: &Schema, rows: usize) -> Vec<Column> {
    schema
        .iter()
        .map(|(name, column_type)| {
            let capacity = column_type.fixed_width().map_or(0, |w| w * rows);
            Column::with_data(name.clone(), *column_type, Vec::with_capacity(capacity))
        })
        .collect()
}
