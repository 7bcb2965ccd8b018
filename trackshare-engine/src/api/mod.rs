//! HTTP API handlers for trackshare-engine

pub mod auth;
pub mod health;
pub mod internal;
pub mod sweep;
pub mod webhooks;

pub use auth::InternalAuth;
pub use health::health_routes;
pub use internal::internal_routes;
pub use sweep::sweep_routes;
pub use webhooks::webhook_routes;
