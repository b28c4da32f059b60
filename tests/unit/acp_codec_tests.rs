//! Unit tests for the NDJSON codec and inbound line parsing.

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

use gemini_acp_bridge::acp::codec::{AcpCodec, Frame, MAX_LINE_BYTES};
use gemini_acp_bridge::acp::reader::parse_request_line;

fn line(text: &str) -> Option<Frame> {
    Some(Frame::Line(text.to_owned()))
}

#[test]
fn single_line_decodes_without_newline() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"method\":\"initialize\"}\n");

    let frame = codec.decode(&mut buf).expect("decode ok");
    assert_eq!(frame, line("{\"method\":\"initialize\"}"));
}

#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"id\":1}\n{\"id\":2}\n");

    assert_eq!(codec.decode(&mut buf).unwrap(), line("{\"id\":1}"));
    assert_eq!(codec.decode(&mut buf).unwrap(), line("{\"id\":2}"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"method\":");

    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    buf.extend_from_slice(b"\"cancel\"}\n");
    assert_eq!(codec.decode(&mut buf).unwrap(), line("{\"method\":\"cancel\"}"));
}

#[test]
fn oversized_line_is_reported_then_skipped() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_BYTES + 1].as_slice());

    assert_eq!(codec.decode(&mut buf).expect("decode ok"), Some(Frame::Oversized));

    buf.extend_from_slice(b"xxxx\n{\"id\":3}\n");
    assert_eq!(codec.decode(&mut buf).expect("decode ok"), line("{\"id\":3}"));
    assert_eq!(codec.decode(&mut buf).expect("decode ok"), None);
}

#[test]
fn encoder_writes_compact_json_line() {
    let mut codec = AcpCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode(json!({"id": 1, "text": "two\nlines"}), &mut dst)
        .expect("encode ok");
    assert_eq!(&dst[..], b"{\"id\":1,\"text\":\"two\\nlines\"}\n");
}

#[test]
fn malformed_json_line_reports_malformed_json() {
    let err = parse_request_line("{\"id\": 1,").expect_err("malformed");
    assert!(err.to_string().starts_with("acp: malformed json"), "got: {err}");
}

#[test]
fn string_id_is_preserved() {
    let request = parse_request_line(r#"{"jsonrpc":"2.0","id":"req-7","method":"newSession","params":{}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(request.id, Some(serde_json::json!("req-7")));
    assert_eq!(request.jsonrpc.as_deref(), Some("2.0"));
}
