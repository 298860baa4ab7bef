pub mod auth_service;
pub mod auth_service_impl;
pub mod notifications;

pub use auth_service::{AuthResult, AuthService};
pub use auth_service_impl::GatewayAuthService;
pub use notifications::NotificationListener;
