//! Catalog module - remote API access and the three stage algorithms
//!
//! The boundary to the remote catalog API is the [`api::CatalogApi`] trait;
//! every payload is validated into the typed schemas of [`schema`] before a
//! stage touches it. The stage algorithms themselves (`products`, `prices`,
//! `combine`) are plain async functions so the pipeline workers stay thin.

pub mod api;
pub mod combine;
pub mod prices;
pub mod products;
pub mod resolve;
pub mod schema;

pub use api::{CatalogApi, HttpCatalogApi};
