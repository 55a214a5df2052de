use super::comparer::AtomicComparer;
use super::definition::SortKeyDefinition;
use crate::context::DynamicContext;
use crate::error::Error;
use crate::xdm::{AtomicValue, Item, Sequence};
use core::cmp::Ordering;
use smallvec::SmallVec;
use std::sync::Arc;

/// Evaluated sort key values of one item; `None` is the empty sequence.
pub type KeyValues = SmallVec<[Option<AtomicValue>; 4]>;

/// Stable sort of `records` by their key values. The first comparison error
/// stops the sort and is returned.
pub(crate) fn sort_by_keys<T>(
    records: Vec<(T, KeyValues)>,
    comparers: &[Arc<dyn AtomicComparer>],
) -> Result<Vec<(T, KeyValues)>, Error> {
    let order = merge_sort(records.len(), |i, j| compare_keys(&records[i].1, &records[j].1, comparers))?;
    let mut slots: Vec<Option<(T, KeyValues)>> = records.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Bottom-up merge sort over the indices `0..len`. On a tie the element from
/// the left run is taken first, which keeps the sort stable.
fn merge_sort(
    len: usize,
    mut compare: impl FnMut(usize, usize) -> Result<Ordering, Error>,
) -> Result<Vec<usize>, Error> {
    let mut src: Vec<usize> = (0..len).collect();
    let mut dst = vec![0; len];
    let mut width = 1;
    while width < len {
        for start in (0..len).step_by(2 * width) {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j) = (start, mid);
            for slot in &mut dst[start..end] {
                let take_right = i >= mid || (j < end && compare(src[j], src[i])?.is_lt());
                if take_right {
                    *slot = src[j];
                    j += 1;
                } else {
                    *slot = src[i];
                    i += 1;
                }
            }
        }
        core::mem::swap(&mut src, &mut dst);
        width *= 2;
    }
    Ok(src)
}

fn compare_keys(a: &KeyValues, b: &KeyValues, comparers: &[Arc<dyn AtomicComparer>]) -> Result<Ordering, Error> {
    for ((x, y), comparer) in a.iter().zip(b.iter()).zip(comparers) {
        let ord = comparer.compare_atomic_values(x.as_ref(), y.as_ref())?;
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

/// Items of a sequence in sort order.
///
/// Every key is evaluated exactly once per item, before sorting starts. Keys
/// that set the context are evaluated with the item as context item and its
/// 1-based position in the input.
#[derive(Debug)]
pub struct SortedIterator {
    items: std::vec::IntoIter<Item>,
}

impl SortedIterator {
    pub fn new(
        input: Sequence,
        keys: &[SortKeyDefinition],
        comparers: &[Arc<dyn AtomicComparer>],
        ctx: &DynamicContext,
    ) -> Result<Self, Error> {
        let size = input.len();
        let mut records = Vec::with_capacity(size);
        for (i, item) in input.into_iter().enumerate() {
            let values = evaluate_keys(&item, i + 1, size, keys, ctx)?;
            records.push((item, values));
        }
        let records = sort_by_keys(records, comparers)?;
        tracing::trace!(items = size, keys = keys.len(), "sorted");
        let items: Vec<Item> = records.into_iter().map(|(item, _)| item).collect();
        Ok(Self { items: items.into_iter() })
    }
}

fn evaluate_keys(
    item: &Item,
    position: usize,
    size: usize,
    keys: &[SortKeyDefinition],
    ctx: &DynamicContext,
) -> Result<KeyValues, Error> {
    let focused = keys
        .iter()
        .any(SortKeyDefinition::is_setting_context_for_sort_key)
        .then(|| ctx.with_focus(item.clone(), position, size));
    keys.iter()
        .map(|key| {
            let key_ctx = match &focused {
                Some(f) if key.is_setting_context_for_sort_key() => f,
                _ => ctx,
            };
            Ok(key.sort_key().evaluate_item(key_ctx)?.map(|i| i.atomize()))
        })
        .collect()
}

impl Iterator for SortedIterator {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for SortedIterator {}
