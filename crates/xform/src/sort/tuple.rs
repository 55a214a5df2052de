use super::comparer::AtomicComparer;
use super::definition::SortKeyDefinition;
use super::sorted::{KeyValues, sort_by_keys};
use crate::context::DynamicContext;
use crate::error::Error;
use crate::xdm::{AtomicValue, Sequence};
use std::sync::Arc;

/// One binding tuple of a FLWOR expression: the items it contributes to the
/// result and its already evaluated `order by` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub payload: Sequence,
    pub keys: KeyValues,
}

impl Tuple {
    pub fn new(payload: Sequence, keys: impl IntoIterator<Item = Option<AtomicValue>>) -> Self {
        Self { payload, keys: keys.into_iter().collect() }
    }
}

/// Sorts tuples by their carried keys and returns the concatenated payloads.
#[derive(Debug)]
pub struct TupleSorter {
    keys: Vec<SortKeyDefinition>,
}

impl TupleSorter {
    pub fn new(keys: Vec<SortKeyDefinition>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[SortKeyDefinition] {
        &self.keys
    }

    /// Each key is fixed in `ctx` before its comparator is built, since the
    /// key values themselves were computed by the caller.
    pub fn comparators(&self, ctx: &DynamicContext) -> Result<Vec<Arc<dyn AtomicComparer>>, Error> {
        self.keys
            .iter()
            .map(|key| match key.final_comparator() {
                Some(c) => Ok(c.clone()),
                None => key.fix(ctx)?.make_comparator(ctx),
            })
            .collect()
    }

    pub fn sort(&self, tuples: Vec<Tuple>, ctx: &DynamicContext) -> Result<Sequence, Error> {
        let comparators = self.comparators(ctx)?;
        let records: Vec<(Sequence, KeyValues)> = tuples.into_iter().map(|t| (t.payload, t.keys)).collect();
        let records = sort_by_keys(records, &comparators)?;
        Ok(records.into_iter().flat_map(|(payload, _)| payload).collect())
    }
}
