//! Storefront backend library.
//!
//! Domain types and ports live in [`domain`], HTTP adapters in [`inbound`],
//! storage and catalogue adapters in [`outbound`] and the request pipeline in
//! [`middleware`]. [`server`] assembles them into an Actix application.

pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod server;
pub mod settings;

pub use server::{ServerConfig, build_app, create_server};
pub use settings::StorefrontSettings;
