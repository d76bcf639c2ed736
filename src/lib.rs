pub mod h3;
pub mod qpack;
pub mod stream;
pub mod types;
pub mod utils;

pub use h3::{ClientConn, Handler, ResponseWriter, Server, ServerConn, ServerRequest};
pub use stream::*;
pub use types::*;
pub use utils::*;
