pub mod config;
pub mod error;
pub mod key;

pub use config::{load_dotenv, PoolConfig};
pub use error::*;
pub use key::JobKey;
