//! Process-wide tracing setup. Output is checked by hand; run the binary
//! with `log.format = "json"` to see the structured variant.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
