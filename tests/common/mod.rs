#![allow(dead_code)]

use bytes::{BufMut, Bytes, BytesMut};
use quinn::{Connection, Endpoint, SendStream};
use riph3::stream::{client_config, server_config};
use riph3::types::FrameH3;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn self_signed() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let key_pair = rcgen::KeyPair::generate().expect("key pair");
    let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).expect("params");
    let cert = params.self_signed(&key_pair).expect("self-signed certificate");
    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
    (vec![cert.der().clone()], key.into())
}

pub fn server_endpoint() -> Endpoint {
    let (certs, key) = self_signed();
    let config = server_config(certs, key).expect("server config");
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    Endpoint::server(config, addr).expect("server endpoint")
}

pub async fn dial(addr: SocketAddr) -> (Endpoint, Connection) {
    let bind: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let mut endpoint = Endpoint::client(bind).expect("client endpoint");
    endpoint.set_default_client_config(client_config(false).expect("client config"));
    let conn = endpoint
        .connect(addr, "localhost")
        .expect("connect")
        .await
        .expect("handshake");
    (endpoint, conn)
}

/// A QUIC connection with both ends in hand. The endpoints are kept so the
/// connection outlives the helper.
pub struct Pair {
    pub client_endpoint: Endpoint,
    pub server_endpoint: Endpoint,
    pub client: Connection,
    pub server: Connection,
}

pub async fn pair() -> Pair {
    let server_endpoint = server_endpoint();
    let addr = server_endpoint.local_addr().expect("local addr");
    let accept = async {
        server_endpoint
            .accept()
            .await
            .expect("incoming")
            .await
            .expect("server handshake")
    };
    let ((client_endpoint, client), server) = tokio::join!(dial(addr), accept);
    Pair {
        client_endpoint,
        server_endpoint,
        client,
        server,
    }
}

pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut).await.expect("timed out")
}

/// The application error code the peer closed `conn` with.
pub async fn closed_code(conn: &Connection) -> u64 {
    match within(conn.closed()).await {
        quinn::ConnectionError::ApplicationClosed(close) => close.error_code.into_inner(),
        other => panic!("connection closed without an application code: {other}"),
    }
}

pub fn varint(buf: &mut BytesMut, value: u64) {
    match value {
        0..=63 => buf.put_u8(value as u8),
        64..=16383 => buf.put_u16(0x4000 | value as u16),
        16384..=1073741823 => buf.put_u32(0x8000_0000 | value as u32),
        _ => buf.put_u64(0xc000_0000_0000_0000 | value),
    }
}

/// Stream type 0x00 followed by a SETTINGS frame.
pub fn control_stream(settings: &[(u64, u64)]) -> BytesMut {
    let mut buf = BytesMut::new();
    varint(&mut buf, 0x00);
    buf.extend_from_slice(&FrameH3::settings(settings).serialize());
    buf
}

pub fn frame(ftype: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    varint(&mut buf, ftype);
    varint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Opens a unidirectional stream and writes `data`. The stream is kept open
/// unless `finish` is set; dropping the returned handle finishes it.
pub async fn open_uni_with(conn: &Connection, data: &[u8], finish: bool) -> SendStream {
    let mut send = conn.open_uni().await.expect("open uni");
    send.write_all(data).await.expect("write");
    if finish {
        send.finish().expect("finish");
    }
    send
}
