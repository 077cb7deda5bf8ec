//! Property-based tests for the STOMP text codec.
//!
//! The codec must preserve header values containing the characters STOMP
//! escapes, and bodies containing NUL when `content-length` is present.

use parley_proto::{Command, Destination, Frame};
use proptest::prelude::*;

/// Header values biased towards the characters that need escaping.
fn header_value() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            4 => any::<char>().prop_filter("no NUL", |c| *c != '\0'),
            1 => Just(':'),
            1 => Just('\\'),
            1 => Just('\n'),
            1 => Just('\r'),
        ],
        0..32,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_escaped_headers_survive_codec(value in header_value(), body in ".{0,64}") {
        let frame = Frame::new(Command::Message)
            .with_header("x-note", value.clone())
            .with_body(body.clone());

        let decoded = Frame::decode(&frame.encode()).unwrap().unwrap();

        // PROPERTY: header value and body come back unchanged
        prop_assert_eq!(decoded.header("x-note"), Some(value.as_str()));
        prop_assert_eq!(decoded.body(), body.as_str());
    }

    #[test]
    fn prop_content_length_bounds_body_with_nul(
        parts in prop::collection::vec("[a-z]{0,8}", 1..5),
    ) {
        let body = parts.join("\0");
        let frame = Frame::new(Command::Message).with_body(body.clone());

        let decoded = Frame::decode(&frame.encode()).unwrap().unwrap();

        // PROPERTY: NUL inside a length-delimited body does not end the frame
        prop_assert_eq!(decoded.body(), body.as_str());
    }

    #[test]
    fn prop_decode_never_panics(input in ".{0,256}") {
        let _ = Frame::decode(&input);
    }
}

#[test]
fn connect_frame_wire_format() {
    let frame = Frame::connect("/", Some("abc.def.ghi"));
    insta::assert_snapshot!(
        format!("{:?}", frame.encode()),
        @r#""CONNECT\naccept-version:1.2\nhost:/\nheart-beat:0,0\nAuthorization:Bearer abc.def.ghi\n\n\0""#
    );
}

#[test]
fn send_frame_wire_format() {
    let destination = Destination::App(42, parley_proto::AppCommand::Send).to_string();
    let frame = Frame::send(&destination, Some(r#"{"conversationId":42,"content":"hi"}"#.to_owned()));
    insta::assert_snapshot!(
        format!("{:?}", frame.encode()),
        @r#""SEND\ndestination:/app/chat/42/send\ncontent-type:application/json\ncontent-length:36\n\n{\"conversationId\":42,\"content\":\"hi\"}\0""#
    );
}
