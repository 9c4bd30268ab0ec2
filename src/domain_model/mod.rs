mod client;
mod rate_limit;
mod session;
mod token;

pub use client::*;
pub use rate_limit::*;
pub use session::*;
pub use token::*;
