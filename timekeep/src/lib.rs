mod client;
mod credentials;
pub mod domain;
mod error;
mod reconciler;
pub mod time_utils;
mod timer;
mod transport;

pub use client::*;
pub use credentials::*;
pub use error::ApiError;
pub use error::ValidationError;
pub use reconciler::*;
pub use timer::*;
pub use transport::*;
