pub mod config;
pub mod error;
pub mod stream;
pub mod tier;
pub mod tool;
pub mod trace;
