//! Fuzz target for Frame::decode
//!
//! Arbitrary text must never panic the decoder, and anything it accepts must
//! encode again without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::Frame;

fuzz_target!(|data: &str| {
    if let Ok(Some(frame)) = Frame::decode(data) {
        let _ = Frame::decode(&frame.encode());
    }
});
