pub mod data;
pub mod io;

pub use data::{Config, Endpoints};
pub use io::ConfigError;
