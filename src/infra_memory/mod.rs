mod manual_clock;
mod token_cache_memory;
mod token_store_memory;

pub use manual_clock::*;
pub use token_cache_memory::*;
pub use token_store_memory::*;
