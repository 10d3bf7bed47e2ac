pub mod config_manager;
pub mod discovery;
pub mod error;
pub mod traits;
pub mod types;

pub use config_manager::*;
pub use discovery::*;
pub use error::*;
pub use traits::*;
pub use types::*;
