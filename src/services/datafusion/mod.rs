// DataFusion Engine Module
//
// Embedded query engine for sources that have no server of their own:
// flat files (CSV / NDJSON) and in-process document collections. Native
// statements generated for those sources run here.

pub mod converter; // DataFusionResultConverter
pub mod executor; // DataFusionQueryExecutor
pub mod session; // DataFusionSessionManager

pub use converter::DataFusionResultConverter;
pub use executor::DataFusionQueryExecutor;
pub use session::{DataFusionSessionManager, SessionConfig};
