pub mod api;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod engine;
pub mod error;
pub mod feed;
pub mod finder;
pub mod geo;
pub mod index;
pub mod state;
