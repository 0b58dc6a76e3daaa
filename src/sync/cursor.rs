use serde::de::DeserializeOwned;

use crate::{
    cursor::{AsyncCursor, AsyncCursorEnumerator},
    error::Result,
    runtime,
};

/// A blocking iterator over the documents of an [`AsyncCursor`].
///
/// Further batches are fetched with `getMore` as the iterator advances, so any call to
/// [`Iterator::next`] may block on the network. That is why the items are `Result<T>` rather
/// than `T`. Dropping the cursor before it is exhausted kills the server cursor in the
/// background.
///
/// ```rust,no_run
/// # use mongodb_core::{bson::Document, error::Result, sync::Cursor};
/// # fn count(cursor: Cursor<Document>) -> Result<usize> {
/// let mut n = 0;
/// for document in cursor {
///     let _document = document?;
///     n += 1;
/// }
/// # Ok(n)
/// # }
/// ```
#[derive(Debug)]
pub struct Cursor<T> {
    enumerator: AsyncCursorEnumerator<T>,
}

impl<T> Cursor<T>
where
    T: DeserializeOwned + Send,
{
    pub(crate) fn new(cursor: AsyncCursor<T>) -> Self {
        Self {
            enumerator: AsyncCursorEnumerator::new(cursor),
        }
    }

    /// The cursor being iterated.
    pub fn cursor(&self) -> &AsyncCursor<T> {
        self.enumerator.cursor()
    }

    /// Collects every remaining document.
    pub fn to_vec(self) -> Result<Vec<T>> {
        runtime::block_on(self.enumerator.to_vec())
    }

    /// Stops iterating and kills the server cursor if it is still open.
    pub fn close(&mut self) {
        runtime::block_on(self.enumerator.close())
    }
}

impl<T> From<AsyncCursor<T>> for Cursor<T>
where
    T: DeserializeOwned + Send,
{
    fn from(cursor: AsyncCursor<T>) -> Self {
        Self::new(cursor)
    }
}

impl<T> Iterator for Cursor<T>
where
    T: DeserializeOwned + Send,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        runtime::block_on(self.enumerator.next()).transpose()
    }
}
