//! Fuzz target for TypingDebouncer
//!
//! Drives the debouncer with arbitrary keystrokes, clock jumps, timer
//! firings and sends.
//!
//! # Invariants
//!
//! - Published signals strictly alternate, starting with Started
//! - A stop is only published while announced
//! - An armed deadline always lies after the keystroke that set it

#![no_main]

use std::{ops::Add, time::Duration};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{TypingAction, TypingDebouncer, TypingSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Millis(u64);

impl Add<Duration> for Millis {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX)))
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Op {
    Keystroke,
    Advance(u16),
    Fire,
    Send,
    Cancel,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut debouncer = TypingDebouncer::new(Duration::from_millis(3_000));
    let mut now = Millis(0);
    let mut last: Option<TypingSignal> = None;

    for op in ops {
        let actions = match op {
            Op::Keystroke => debouncer.keystroke(now),
            Op::Advance(ms) => {
                now = now + Duration::from_millis(u64::from(ms));
                Vec::new()
            },
            Op::Fire => debouncer.expire(now),
            Op::Send => debouncer.finish(),
            Op::Cancel => {
                let actions = debouncer.cancel();
                // Cancel drops the period without a stop.
                last = None;
                actions
            },
        };

        for action in actions {
            match action {
                TypingAction::Publish(signal) => {
                    let expected =
                        if last == Some(TypingSignal::Started) { TypingSignal::Stopped } else { TypingSignal::Started };
                    assert_eq!(signal, expected, "signals must alternate");
                    last = Some(signal);
                },
                TypingAction::Arm { deadline } => assert!(deadline > now, "deadline not in the future"),
                TypingAction::Disarm => {},
            }
        }
        assert_eq!(debouncer.is_announced(), last == Some(TypingSignal::Started));
    }
});
