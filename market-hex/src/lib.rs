//! # Market Hex
//!
//! Application service layer and HTTP adapter for the car-ads marketplace.
//!
//! ## Architecture
//!
//! - `service/` - Application service (ledger, ad lifecycle, statistics)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - Collaborator adapters (content filter)
//!
//! The service is generic over `R: MarketRepository`, allowing
//! different repository implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use outbound::{AllowAll, KeywordFilter, content_filter};
pub use service::{MarketService, ServiceConfig};
