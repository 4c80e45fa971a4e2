pub mod join_catalog;

pub use join_catalog::JoinCatalogStore;
