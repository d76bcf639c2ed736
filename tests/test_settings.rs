use bytes::Bytes;
use riph3::h3::framing::FrameStream;
use riph3::h3::settings::{read_settings, write_settings, Settings};
use riph3::types::{FrameH3, Http3Error, ProtocolError};
use tokio_test::io::Builder;

async fn read_all(wire: &[u8]) -> Result<Vec<(u64, u64)>, ProtocolError> {
    let mut st = FrameStream::new(wire);
    let mut pairs = Vec::new();
    read_settings(&mut st, |id, value| {
        pairs.push((id, value));
        Ok(())
    })
    .await?;
    Ok(pairs)
}

#[tokio::test]
async fn writes_local_settings() {
    let expected = [
        0x04, 0x09, 0x01, 0x00, 0x07, 0x00, 0x06, 0x80, 0x01, 0x00, 0x00,
    ];
    let mock = Builder::new().write(&expected).build();
    let mut st = FrameStream::new(mock);
    write_settings(&mut st, &Settings::local(65_536).to_pairs());
    st.flush().await.expect("flush");
}

#[tokio::test]
async fn reads_pairs_in_order() {
    let wire = FrameH3::settings(&[(0x06, 4096), (0x01, 0), (0x07, 0)]).serialize();
    let pairs = read_all(&wire).await.expect("settings");
    assert_eq!(pairs, vec![(0x06, 4096), (0x01, 0), (0x07, 0)]);

    let settings = Settings::from_pairs(&pairs);
    assert_eq!(settings.max_field_section_size, Some(4096));
}

#[tokio::test]
async fn unknown_settings_are_passed_through() {
    let grease = 0x1f * 3 + 0x21;
    let wire = FrameH3::settings(&[(grease, 7), (0x06, 100)]).serialize();
    let pairs = read_all(&wire).await.expect("grease setting accepted");
    assert_eq!(pairs, vec![(grease, 7), (0x06, 100)]);

    let settings = Settings::from_pairs(&pairs);
    assert_eq!(settings.max_field_section_size, Some(100));
    assert_eq!(settings.qpack_max_table_capacity, 0);
}

#[tokio::test]
async fn reserved_http2_settings_are_rejected() {
    for id in 0x02..=0x05 {
        let wire = FrameH3::settings(&[(id, 1)]).serialize();
        let err = read_all(&wire).await.expect_err("reserved id");
        assert!(matches!(err, ProtocolError::Connection(ref e) if e.code == Http3Error::SettingsError));
    }
}

#[tokio::test]
async fn duplicate_setting_is_rejected() {
    let wire = FrameH3::settings(&[(0x06, 1), (0x06, 2)]).serialize();
    let err = read_all(&wire).await.expect_err("duplicate id");
    assert_eq!(err.code(), Some(Http3Error::SettingsError));
}

#[tokio::test]
async fn settings_must_come_first() {
    let wire = FrameH3::data(Bytes::from_static(b"x")).serialize();
    let err = read_all(&wire).await.expect_err("DATA first");
    assert_eq!(err.code(), Some(Http3Error::MissingSettings));

    let err = read_all(&[]).await.expect_err("empty control stream");
    assert_eq!(err.code(), Some(Http3Error::ClosedCriticalStream));
}

#[tokio::test]
async fn truncated_pair_is_frame_error() {
    // Length claims two bytes but the pair needs three.
    let wire = [0x04, 0x02, 0x06, 0x40, 0x64];
    let err = read_all(&wire).await.expect_err("pair crosses frame end");
    assert_eq!(err.code(), Some(Http3Error::FrameError));
}

#[test]
fn defaults_before_peer_settings() {
    let settings = Settings::default();
    assert_eq!(settings.max_field_section_size, None);
    assert_eq!(settings.qpack_max_table_capacity, 0);
    assert_eq!(settings.qpack_blocked_streams, 0);
}
