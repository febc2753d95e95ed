pub mod common;
pub mod metadata;
pub mod pull;
pub mod resolve;
pub mod show;
