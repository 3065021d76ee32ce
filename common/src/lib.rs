pub mod error;
pub mod schema;
pub mod storage;
pub mod utils;
