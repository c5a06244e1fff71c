// Library exports for testing and potential reuse

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod model;
pub mod routes;
pub mod server;

// Re-export commonly used types
pub use config::{AppConfig, Environment};
pub use error::AppError;
pub use server::AppState;
