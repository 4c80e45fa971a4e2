pub mod expression;
pub mod join_catalog;
pub mod metadata;
pub mod plan;
pub mod query;
pub mod result;

pub use expression::*;
pub use join_catalog::*;
pub use metadata::*;
pub use plan::*;
pub use query::*;
pub use result::*;
