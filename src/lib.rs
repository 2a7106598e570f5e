pub mod catalog;
pub mod client;
pub mod debug;
pub mod downloader;
pub mod errors;
pub mod models;
pub mod parser;
pub mod tui;
pub mod utils;

pub use catalog::{extract, Catalog, DistancePolicy, RawPayload};
pub use errors::CatalogError;
pub use models::{Category, TourRecord};
pub use utils::export_csv;
