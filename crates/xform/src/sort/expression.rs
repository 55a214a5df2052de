use super::comparer::AtomicComparer;
use super::definition::SortKeyDefinition;
use super::sorted::SortedIterator;
use crate::context::{DynamicContext, StaticContext};
use crate::error::Error;
use crate::expr::Expression;
use crate::xdm::{PrimitiveType, Sequence};
use std::sync::Arc;

/// Resolve the comparator of every key, reusing those fixed at compile time.
pub(crate) fn comparators_for(
    keys: &[SortKeyDefinition],
    ctx: &DynamicContext,
) -> Result<Vec<Arc<dyn AtomicComparer>>, Error> {
    keys.iter()
        .map(|key| match key.final_comparator() {
            Some(c) => Ok(c.clone()),
            None => key.make_comparator(ctx),
        })
        .collect()
}

/// A sequence sorted by one or more keys (`xsl:sort`, `order by`).
#[derive(Debug)]
pub struct SortExpression {
    select: Arc<dyn Expression>,
    keys: Vec<SortKeyDefinition>,
    comparators: Option<Vec<Arc<dyn AtomicComparer>>>,
}

impl SortExpression {
    pub fn new(select: Arc<dyn Expression>, keys: Vec<SortKeyDefinition>) -> Self {
        Self { select, keys, comparators: None }
    }

    pub fn select(&self) -> &Arc<dyn Expression> {
        &self.select
    }

    pub fn keys(&self) -> &[SortKeyDefinition] {
        &self.keys
    }

    /// Whether every key's comparator was resolved at compile time.
    pub fn is_fixed(&self) -> bool {
        self.comparators.is_some()
    }

    /// Resolve the comparators of fixed keys now. When all keys are fixed the
    /// comparator array is built once and reused by every evaluation.
    pub fn type_check(&mut self, static_ctx: &StaticContext) -> Result<(), Error> {
        let early = DynamicContext::early(static_ctx);
        for key in &mut self.keys {
            if key.is_setting_context_for_sort_key() && !key.sort_key().depends_on_focus() {
                tracing::warn!(key = ?key.sort_key(), "sort key does not depend on the context item");
            }
            if key.is_fixed() && key.final_comparator().is_none() {
                let comparator = key.make_comparator(&early)?;
                key.set_final_comparator(comparator);
            }
        }
        if self.keys.iter().all(|k| k.final_comparator().is_some()) {
            self.comparators = Some(comparators_for(&self.keys, &early)?);
        }
        tracing::debug!(keys = self.keys.len(), fixed = self.is_fixed(), "sort expression type-checked");
        Ok(())
    }

    pub fn iterate(&self, ctx: &DynamicContext) -> Result<SortedIterator, Error> {
        let comparators = match &self.comparators {
            Some(c) => c.clone(),
            None => comparators_for(&self.keys, ctx)?,
        };
        let input = self.select.evaluate(ctx)?;
        SortedIterator::new(input, &self.keys, &comparators, ctx)
    }
}

impl Expression for SortExpression {
    fn evaluate(&self, ctx: &DynamicContext) -> Result<Sequence, Error> {
        Ok(self.iterate(ctx)?.collect())
    }

    fn static_type(&self) -> PrimitiveType {
        self.select.static_type()
    }

    fn depends_on_focus(&self) -> bool {
        self.select.depends_on_focus()
    }
}
