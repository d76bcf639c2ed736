//! HTTP/3 (RFC 9114) over QUIC streams provided by `quinn`.

pub mod body;
pub mod client;
pub mod connection;
pub mod consts;
pub mod framing;
pub mod message;
pub mod roundtrip;
pub mod server;
pub mod settings;
pub mod varint;

pub use client::ClientConn;
pub use connection::{ConnCore, StreamHandler};
pub use framing::FrameStream;
pub use roundtrip::ResponseBody;
pub use server::{Handler, ResponseWriter, Server, ServerConn, ServerRequest};
pub use settings::Settings;
