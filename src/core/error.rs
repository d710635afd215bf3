use thiserror::Error;

use crate::connection::DriverError;

/// Structural errors raised while deriving a schema from type descriptors.
///
/// These are programmer errors: the type graph describes a shape the
/// relational mapping cannot represent. They are reported once, at
/// schema-derivation time, never per row at runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error(
        "field '{field}': '{declared}' nests a collection inside a collection; move the inner collection onto an owned entity"
    )]
    NestedCollection { field: String, declared: String },

    #[error("field '{field}': '{declared}' is untyped; declare a concrete element type")]
    UntypedElement { field: String, declared: String },

    #[error("field '{field}': map key type '{key_type}' is not a primitive; map keys must be primitive scalars")]
    NonPrimitiveMapKey { field: String, key_type: String },

    #[error("field '{field}': aggregate root '{element}' cannot live inside a collection; reference it by id instead")]
    RootInCollection { field: String, element: String },

    #[error("field '{field}': aggregate root '{target}' cannot be embedded as a field; reference it by id instead")]
    RootEmbedded { field: String, target: String },

    #[error("field '{field}': value type '{type_name}' cannot contain an entity; entities belong to an owning entity or root")]
    EntityInsideValue { field: String, type_name: String },

    #[error("field '{field}': value type '{type_name}' cannot contain a collection; move the collection onto the owning entity")]
    CollectionInsideValue { field: String, type_name: String },

    #[error("field '{field}': type '{type_name}' is not registered")]
    UnknownType { field: String, type_name: String },

    #[error("type '{type_name}' is reachable from itself; aggregates must form a tree")]
    RecursiveType { type_name: String },

    #[error("type '{type_name}' is not registered as an aggregate root")]
    NotAnAggregate { type_name: String },

    #[error("entity type '{type_name}' has no identity field")]
    MissingIdentity { type_name: String },

    #[error("entity type '{type_name}' declares identity of type '{declared}'; identity must be a primitive scalar")]
    IdentityNotScalar { type_name: String, declared: String },

    #[error("value type '{type_name}' must not declare an identity field")]
    ValueWithIdentity { type_name: String },

    #[error("type '{type_name}' is already registered")]
    DuplicateType { type_name: String },

    #[error("table '{table}' is generated more than once; an entity type can only be owned through a single field")]
    DuplicateTable { table: String },

    #[error("field '{field}': '{declared}' is not a collection")]
    NotACollection { field: String, declared: String },
}

/// Runtime persistence failures surfaced by the orchestrator.
///
/// Driver failures are classified through the dialect's detection rules;
/// `Unknown` keeps the original error for diagnostics. `NotFound` is raised
/// directly on zero matched/affected rows, never inferred from a driver
/// error. The engine never retries.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("aggregate '{0}' not found")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("unclassified driver error: {source}")]
    Unknown {
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
