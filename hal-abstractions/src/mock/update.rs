//! Mock update session with scripted events

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::{String, ToString};

use crate::update::{SessionEvent, SessionOptions, UpdateSession};

/// Owned copy of the options passed to `begin`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedOptions {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    script: VecDeque<SessionEvent>,
    polls: u32,
    begun: Option<RecordedOptions>,
}

/// Update session that replays a script of events, then idles
#[derive(Debug, Clone, Default)]
pub struct MockUpdateSession {
    state: Rc<RefCell<SessionState>>,
}

impl MockUpdateSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: SessionEvent) {
        self.state.borrow_mut().script.push_back(event);
    }

    pub fn polls(&self) -> u32 {
        self.state.borrow().polls
    }

    /// Options from the `begin` call, `None` if never started
    pub fn begun_with(&self) -> Option<RecordedOptions> {
        self.state.borrow().begun.clone()
    }
}

impl UpdateSession for MockUpdateSession {
    fn begin(&mut self, options: &SessionOptions<'_>) {
        self.state.borrow_mut().begun = Some(RecordedOptions {
            port: options.port,
            hostname: options.hostname.map(|h| h.to_string()),
            password: options.password.map(|p| p.to_string()),
        });
    }

    fn poll(&mut self) -> SessionEvent {
        let mut state = self.state.borrow_mut();
        state.polls += 1;
        state.script.pop_front().unwrap_or(SessionEvent::Idle)
    }
}
