pub mod collation;
pub mod consts;
pub mod context;
pub mod error;
pub mod event;
pub mod expr;
pub mod location;
pub mod model;
pub mod sort;
pub mod tree;
pub mod xdm;

pub use context::{Configuration, ConfigurationBuilder, DynamicContext, DynamicContextBuilder, StaticContext, StaticContextBuilder};
pub use error::{Error, ErrorCategory, ErrorCode};
pub use event::{Event, Pipeline, PipelineBuilder, PipelineConfiguration, Receiver, ReceiverOptions};
pub use expr::Expression;
pub use location::Location;
pub use model::{NamespaceBinding, NodeKind, NodeName};
pub use sort::{AtomicComparer, ComparisonKey, SortExpression, SortKeyDefinition, SortedIterator, TupleSorter};
pub use tree::Node;
pub use xdm::{AtomicValue, ExpandedName, Item, PrimitiveType, Sequence};
