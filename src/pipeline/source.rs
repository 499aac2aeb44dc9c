use crate::{ClientError, protocol::Row};

/// Pull-based producer of rows.
///
/// Rows must match the sample block's column order and types. `next_row` is
/// only called while downstream credit remains, so a source never needs to
/// buffer ahead.
pub trait RowSource: Send + 'static {
    /// `None` ends the stream.
    fn next_row(&mut self) -> Option<Result<Row, ClientError>>;

    /// Called at most once, after which `next_row` is never called again.
    fn cancel(&mut self) {}
}

/// Adapts any row iterator.
#[derive(Debug)]
pub struct IterSource<I> {
    rows: I,
}

impl<I> IterSource<I> {
    pub fn new(rows: I) -> Self {
        Self { rows }
    }
}

impl<I> RowSource for IterSource<I>
where
    I: Iterator<Item = Row> + Send + 'static,
{
    fn next_row(&mut self) -> Option<Result<Row, ClientError>> {
        self.rows.next().map(Ok)
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Option<Result<Row, ClientError>> {
        (**self).next_row()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}
