pub mod config;
pub mod consensus;
pub mod outcome;
pub mod patterns;
pub mod record;
pub mod storage;
pub mod store;
pub mod sync;
