mod backends;
mod reaper;
mod server;

pub use backends::*;
pub use reaper::*;
pub use server::*;
