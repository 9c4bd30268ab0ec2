pub mod cache_key;

mod clock;
mod token_cache;
mod token_store;

pub use clock::*;
pub use token_cache::*;
pub use token_store::*;
