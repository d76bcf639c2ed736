pub mod cancel;
pub mod config;
pub mod error;
pub mod frame;
pub mod header;
pub mod request;
pub mod response;
pub mod target;

pub use cancel::*;
pub use config::*;
pub use error::*;
pub use frame::*;
pub use header::*;
pub use request::*;
pub use response::*;
pub use target::*;
