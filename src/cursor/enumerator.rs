use std::collections::VecDeque;

use futures_core::Stream;
use serde::de::DeserializeOwned;

use crate::{cursor::AsyncCursor, error::Result};

/// Iterates over the documents of an [`AsyncCursor`] one at a time.
///
/// The underlying cursor is only advanced once every document of its current batch has been
/// handed out.
#[derive(Debug)]
pub struct AsyncCursorEnumerator<T> {
    cursor: AsyncCursor<T>,
    buffer: VecDeque<T>,
    finished: bool,
}

impl<T> AsyncCursorEnumerator<T>
where
    T: DeserializeOwned + Send,
{
    /// Wraps `cursor`, which must not have been advanced yet.
    pub fn new(cursor: AsyncCursor<T>) -> Self {
        Self {
            cursor,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    /// The next document, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(document) = self.buffer.pop_front() {
                return Ok(Some(document));
            }
            if self.finished {
                return Ok(None);
            }
            if !self.cursor.move_next().await? {
                self.finished = true;
                return Ok(None);
            }
            self.buffer.extend(self.cursor.take_current_batch());
        }
    }

    /// Collects every remaining document.
    pub async fn to_vec(mut self) -> Result<Vec<T>> {
        let mut documents = Vec::new();
        while let Some(document) = self.next().await? {
            documents.push(document);
        }
        Ok(documents)
    }

    /// The cursor being enumerated.
    pub fn cursor(&self) -> &AsyncCursor<T> {
        &self.cursor
    }

    /// Discards any buffered documents and closes the underlying cursor.
    pub async fn close(&mut self) {
        self.buffer.clear();
        self.finished = true;
        self.cursor.close().await;
    }

    /// Turns the enumerator into a [`Stream`]. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: 'static,
    {
        futures_util::stream::unfold(self, |mut enumerator| async move {
            match enumerator.next().await {
                Ok(Some(document)) => Some((Ok(document), enumerator)),
                Ok(None) => None,
                Err(error) => {
                    enumerator.finished = true;
                    enumerator.buffer.clear();
                    Some((Err(error), enumerator))
                }
            }
        })
    }
}

impl<T> From<AsyncCursor<T>> for AsyncCursorEnumerator<T>
where
    T: DeserializeOwned + Send,
{
    fn from(cursor: AsyncCursor<T>) -> Self {
        Self::new(cursor)
    }
}
