mod token_store_mysql;
mod util;

pub use token_store_mysql::*;
