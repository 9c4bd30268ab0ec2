mod auth_service_impl;
mod authenticator;
mod cache_layer;
mod credential;
mod rate_limiter_impl;
mod revocation;

pub use auth_service_impl::*;
pub use authenticator::*;
pub use cache_layer::*;
pub use credential::*;
pub use rate_limiter_impl::*;
pub use revocation::*;
