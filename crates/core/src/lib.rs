pub mod classifier;
pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use classifier::{classify_line, LineClass};
pub use config::*;
pub use errors::*;
pub use models::*;
pub use traits::WorkerTransport;
