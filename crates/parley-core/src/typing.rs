//! Typing presence debouncer.
//!
//! Coalesces local keystrokes into at most one "typing" and one "stopped
//! typing" publish per burst. Uses the action pattern: methods take the
//! current instant and return actions for the driver to execute. The driver
//! owns the actual timer; the debouncer only tells it when to arm and disarm.
//!
//! # State Machine
//!
//! ```text
//!            keystroke / Publish(Started) + Arm
//! ┌──────┐ ─────────────────────────────────────> ┌───────────┐
//! │ Idle │                                        │ Announced │ ─┐ keystroke / Arm
//! └──────┘ <───────────────────────────────────── └───────────┘ <┘
//!            expire / Publish(Stopped)
//!            finish / Publish(Stopped) + Disarm
//!            cancel / Disarm
//! ```
//!
//! # Invariants
//!
//! - Single Stop: exactly one `Publish(Stopped)` per Announced period, no
//!   matter how many keystrokes or expiries occur.
//! - Stale Expiry: an expiry earlier than the current deadline is ignored, so
//!   a timer that raced a later keystroke cannot end the period early.

use std::{ops::Add, time::Duration};

/// Quiet window after the last keystroke before "stopped typing" is sent.
pub const DEFAULT_TYPING_WINDOW: Duration = Duration::from_secs(3);

/// Typing signal published to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypingSignal {
    /// Published to `/app/chat/{id}/typing`.
    Started,
    /// Published to `/app/chat/{id}/stop-typing`.
    Stopped,
}

/// Actions returned by the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingAction<I> {
    /// Publish this signal.
    Publish(TypingSignal),

    /// (Re)arm the quiet-window timer to fire at `deadline`, replacing any
    /// timer already armed.
    Arm {
        /// Instant at which [`TypingDebouncer::expire`] should be called.
        deadline: I,
    },

    /// Cancel the armed timer.
    Disarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State<I> {
    Idle,
    Announced { deadline: I },
}

/// Per-conversation Idle/Announced state machine.
#[derive(Debug, Clone)]
pub struct TypingDebouncer<I> {
    window: Duration,
    state: State<I>,
}

impl<I> TypingDebouncer<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create an idle debouncer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self { window, state: State::Idle }
    }

    /// Quiet window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether "typing" has been published and not yet followed by "stopped
    /// typing".
    pub fn is_announced(&self) -> bool {
        matches!(self.state, State::Announced { .. })
    }

    /// Instant the armed timer should fire, if Announced.
    pub fn deadline(&self) -> Option<I> {
        match self.state {
            State::Idle => None,
            State::Announced { deadline } => Some(deadline),
        }
    }

    /// Local keystroke at `now`.
    ///
    /// From Idle this announces and arms. From Announced it only pushes the
    /// deadline out.
    pub fn keystroke(&mut self, now: I) -> Vec<TypingAction<I>> {
        let deadline = now + self.window;
        let was_idle = matches!(self.state, State::Idle);
        self.state = State::Announced { deadline };

        if was_idle {
            vec![TypingAction::Publish(TypingSignal::Started), TypingAction::Arm { deadline }]
        } else {
            vec![TypingAction::Arm { deadline }]
        }
    }

    /// The armed timer fired at `now`.
    pub fn expire(&mut self, now: I) -> Vec<TypingAction<I>> {
        match self.state {
            State::Announced { deadline } if now >= deadline => {
                self.state = State::Idle;
                vec![TypingAction::Publish(TypingSignal::Stopped)]
            },
            _ => Vec::new(),
        }
    }

    /// End the Announced period early, e.g. because a message was sent.
    ///
    /// Publishes "stopped typing" if Announced. Idle debouncers return
    /// nothing.
    pub fn finish(&mut self) -> Vec<TypingAction<I>> {
        match self.state {
            State::Idle => Vec::new(),
            State::Announced { .. } => {
                self.state = State::Idle;
                vec![TypingAction::Publish(TypingSignal::Stopped), TypingAction::Disarm]
            },
        }
    }

    /// Drop back to Idle without publishing. Used when the channel is gone.
    pub fn cancel(&mut self) -> Vec<TypingAction<I>> {
        match self.state {
            State::Idle => Vec::new(),
            State::Announced { .. } => {
                self.state = State::Idle;
                vec![TypingAction::Disarm]
            },
        }
    }
}

impl<I> Default for TypingDebouncer<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_WINDOW)
    }
}
