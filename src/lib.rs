pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod local;
pub mod remote;
pub mod store;
