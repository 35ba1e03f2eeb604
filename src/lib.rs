pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod normalize;
pub mod reporter;
pub mod resolver;
pub mod scanner;
pub mod types;
pub mod wallets;

#[cfg(test)]
mod testing;

/// Polymarket data API base URL (public, no auth required)
pub const DATA_API_BASE: &str = "https://data-api.polymarket.com";

/// Polymarket gamma API base URL (market metadata, public)
pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";
