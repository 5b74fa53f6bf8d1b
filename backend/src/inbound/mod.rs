//! Inbound adapters translating external requests into domain calls while
//! keeping framework details at the edge.
//!
//! HTTP handlers and their route table live under [`http`].

pub mod http;
