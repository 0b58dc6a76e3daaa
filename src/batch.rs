//! Windowed views over write requests and the index bookkeeping that ties a command's statements
//! back to the caller's requests.


use std::collections::HashMap;

use crate::error::{Error, Result};

/// A window (`offset`, `count`) over an immutable list of items, of which the first
/// `processed_count` were sent by the last command.
///
/// A command that does not fit the server's limits takes as many items as fit from the front of
/// the window, records that number with [`set_processed_count`](Self::set_processed_count), and
/// the caller then [advances](Self::advance_past_processed_items) past them. A source that
/// cannot be split must be sent whole.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchableSource<T> {
    items: Vec<T>,
    offset: usize,
    count: usize,
    processed_count: usize,
    can_be_split: bool,
}

impl<T> BatchableSource<T> {
    /// A splittable source over all of `items`.
    pub fn new(items: Vec<T>) -> Self {
        let count = items.len();
        Self {
            items,
            offset: 0,
            count,
            processed_count: 0,
            can_be_split: true,
        }
    }

    /// A source over `items[offset..offset + count]`.
    pub fn with_window(
        items: Vec<T>,
        offset: usize,
        count: usize,
        can_be_split: bool,
    ) -> Result<Self> {
        if offset.checked_add(count).is_none_or(|end| end > items.len()) {
            return Err(Error::invalid_argument(format!(
                "window of {count} items at offset {offset} exceeds the {} available items",
                items.len()
            )));
        }
        Ok(Self {
            items,
            offset,
            count,
            processed_count: 0,
            can_be_split,
        })
    }

    /// All items, including the ones outside of the window.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    pub fn can_be_split(&self) -> bool {
        self.can_be_split
    }

    /// Whether the window still holds items that have not been processed.
    pub fn has_items(&self) -> bool {
        self.count > 0
    }

    /// The items inside the window.
    pub fn window(&self) -> &[T] {
        &self.items[self.offset..self.offset + self.count]
    }

    /// The items sent by the last command.
    pub fn processed_items(&self) -> &[T] {
        &self.items[self.offset..self.offset + self.processed_count]
    }

    /// Records how many items from the front of the window were sent.
    pub fn set_processed_count(&mut self, processed_count: usize) -> Result<()> {
        if processed_count > self.count {
            return Err(Error::internal(format!(
                "processed count {processed_count} exceeds the window of {} items",
                self.count
            )));
        }
        if !self.can_be_split && processed_count != self.count {
            return Err(Error::internal(
                "a batch that cannot be split must be processed in full",
            ));
        }
        self.processed_count = processed_count;
        Ok(())
    }

    /// Moves the window past the processed items.
    pub fn advance_past_processed_items(&mut self) {
        self.offset += self.processed_count;
        self.count -= self.processed_count;
        self.processed_count = 0;
    }
}

/// The limits a single command must respect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BatchLimits {
    /// Maximum number of items in one command.
    pub(crate) max_count: usize,
    /// Maximum total size of the items of one command.
    pub(crate) max_size: usize,
    /// Maximum size of a single item.
    pub(crate) max_item_size: usize,
}

/// Decides how many items from the front of the source's window fit into one command, and
/// records the result as the source's processed count. The first item is always taken unless it
/// is larger than a single item may be.
pub(crate) fn split_off_batch<T>(
    source: &mut BatchableSource<T>,
    limits: BatchLimits,
    item_size: impl Fn(&T) -> Result<usize>,
) -> Result<usize> {
    let mut taken = 0;
    let mut size = 0;
    for item in source.window() {
        let this_size = item_size(item)?;
        if this_size > limits.max_item_size {
            return Err(Error::invalid_argument(format!(
                "write statement must be within {} bytes, but the statement provided is {} bytes",
                limits.max_item_size, this_size
            )));
        }
        if taken > 0 && (taken == limits.max_count || size + this_size > limits.max_size) {
            if !source.can_be_split() {
                return Err(Error::invalid_argument(
                    "the batch exceeds the server's limits and cannot be split",
                ));
            }
            break;
        }
        taken += 1;
        size += this_size;
    }
    source.set_processed_count(taken)?;
    Ok(taken)
}

/// Maps the index of a statement within a batch back to the index of the request the caller
/// supplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexMap {
    /// A contiguous run: batch index `batch_offset + i` maps to `original_offset + i` for
    /// `i < count`.
    Range {
        batch_offset: usize,
        original_offset: usize,
        count: usize,
    },
    /// Arbitrary pairs, for batches gathered from scattered positions.
    Dictionary(HashMap<usize, usize>),
}

impl Default for IndexMap {
    fn default() -> Self {
        Self::range(0, 0, 0)
    }
}

impl IndexMap {
    pub fn range(batch_offset: usize, original_offset: usize, count: usize) -> Self {
        Self::Range {
            batch_offset,
            original_offset,
            count,
        }
    }

    /// An empty dictionary based map.
    pub fn dictionary() -> Self {
        Self::Dictionary(HashMap::new())
    }

    pub fn is_range_based(&self) -> bool {
        matches!(self, Self::Range { .. })
    }

    /// The original index of the statement at `batch_index`, if it is mapped.
    pub fn map(&self, batch_index: usize) -> Option<usize> {
        match self {
            Self::Range {
                batch_offset,
                original_offset,
                count,
            } => {
                let relative = batch_index.checked_sub(*batch_offset)?;
                (relative < *count).then_some(original_offset + relative)
            }
            Self::Dictionary(map) => map.get(&batch_index).copied(),
        }
    }

    /// Adds one pair. A range based map stays a range while the pair extends it and otherwise
    /// turns into a dictionary.
    pub fn add(self, batch_index: usize, original_index: usize) -> Self {
        match self {
            Self::Range { count: 0, .. } => Self::range(batch_index, original_index, 1),
            Self::Range {
                batch_offset,
                original_offset,
                count,
            } if batch_index == batch_offset + count
                && original_index == original_offset + count =>
            {
                Self::range(batch_offset, original_offset, count + 1)
            }
            range @ Self::Range { .. } => {
                let mut map: HashMap<usize, usize> = range.pairs().collect();
                map.insert(batch_index, original_index);
                Self::Dictionary(map)
            }
            Self::Dictionary(mut map) => {
                map.insert(batch_index, original_index);
                Self::Dictionary(map)
            }
        }
    }

    /// Adds every pair of `other`.
    pub fn merge(self, other: &IndexMap) -> Self {
        let mut pairs: Vec<(usize, usize)> = other.pairs().collect();
        pairs.sort_unstable();
        pairs
            .into_iter()
            .fold(self, |map, (batch_index, original_index)| {
                map.add(batch_index, original_index)
            })
    }

    /// The mapped pairs as `(batch_index, original_index)`. Range based maps yield them in
    /// order.
    pub fn pairs(&self) -> Box<dyn Iterator<Item = (usize, usize)> + '_> {
        match self {
            Self::Range {
                batch_offset,
                original_offset,
                count,
            } => {
                let (batch_offset, original_offset) = (*batch_offset, *original_offset);
                Box::new((0..*count).map(move |i| (batch_offset + i, original_offset + i)))
            }
            Self::Dictionary(map) => Box::new(map.iter().map(|(k, v)| (*k, *v))),
        }
    }

    /// How many statements are mapped.
    pub fn len(&self) -> usize {
        match self {
            Self::Range { count, .. } => *count,
            Self::Dictionary(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
