use crate::application_port::AuthError;
use crate::domain_model::LimitClass;

#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request for `(class, ip)`. Returns `AuthError::RateLimited`
    /// once the class budget for the current window is spent.
    async fn check(&self, class: LimitClass, ip: &str) -> Result<(), AuthError>;
}
