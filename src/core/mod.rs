pub mod collation;
pub mod document;
pub mod error;
pub mod namespace;
pub mod value;

pub use collation::Collation;
pub use document::Document;
pub use error::{ErrorCode, Result, RouterError};
pub use namespace::Namespace;
pub use value::{KeyValue, ShardKey, compare_values};
