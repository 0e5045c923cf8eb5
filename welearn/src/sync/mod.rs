mod archive;
pub mod cache;
pub mod engine;
pub mod paths;
pub mod resolve;
pub mod status;
pub mod transfer;
