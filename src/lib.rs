pub mod app;
pub mod client;
pub mod common;
pub mod generator;
pub mod shutdown;
