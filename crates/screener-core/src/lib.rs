pub mod cancel;
pub mod config;
pub mod error;
pub mod metric;
pub mod score;
pub mod stats;
pub mod traits;
pub mod types;

pub use cancel::CancelHandle;
pub use config::*;
pub use error::*;
pub use metric::*;
pub use score::*;
pub use traits::*;
pub use types::*;
