#![allow(dead_code, unused_imports)]
pub mod queue_helpers;
pub mod test_db;

pub use queue_helpers::*;
pub use test_db::*;
