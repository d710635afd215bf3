pub mod error;
pub mod value;

pub use error::{SchemaError, SchemaResult, StoreError, StoreResult};
pub use value::{ScalarType, Value};
