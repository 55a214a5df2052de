//! Sort keys, comparers and the sorts built on them.

mod comparer;
mod definition;
mod expression;
mod key;
mod sorted;
mod tuple;

pub use comparer::{
    AtomicComparer, AtomicSortComparer, CalendarValueComparer, CodepointCollatingComparer, CollatingAtomicComparer,
    DecimalSortComparer, DescendingComparer, DoubleSortComparer, EmptyGreatestComparer, NumericComparer, TextComparer,
    make_sort_comparer,
};
pub use definition::{CaseOrder, DataType, Setting, SortKeyDefinition, SortOrder};
pub use expression::SortExpression;
pub use key::ComparisonKey;
pub use sorted::{KeyValues, SortedIterator};
pub use tuple::{Tuple, TupleSorter};
