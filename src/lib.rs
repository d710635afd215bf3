// ============================================================================
// relmap — relational schema generation and object mapping for aggregates
// ============================================================================

pub mod analyzer;
pub mod connection;
pub mod core;
pub mod descriptor;
pub mod dialect;
pub mod mapper;
pub mod query;
pub mod schema;
pub mod store;

// Re-export the main types for convenience
pub use crate::analyzer::{
    CollectionDescriptor, CollectionKind, ElementKind, OwnershipTree, analyze, classify_collection,
};
pub use crate::connection::{Connection, DriverError, DriverResult, QueryResult};
pub use crate::core::{ScalarType, SchemaError, SchemaResult, StoreError, StoreResult, Value};
pub use crate::descriptor::{
    DescriptorRegistry, FieldDescriptor, TypeDescriptor, TypeMarker, TypeRef,
};
pub use crate::dialect::{Dialect, DriverErrorKind, ErrorRules, GenericDialect};
pub use crate::mapper::{JsonMap, flatten, reconstruct};
pub use crate::query::{JoinClause, JoinPlan, JoinType, plan_joins};
pub use crate::schema::{
    ColumnDefinition, ForeignKeyDefinition, OnDeleteAction, TableDefinition, generate_schema,
};
pub use crate::store::{AggregateStore, SerdeSerializer, Serializer};
