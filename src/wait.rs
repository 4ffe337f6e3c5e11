//! Bounded waiting for asynchronous replies.
//!
//! Selection transfers complete only when the peer's events get dispatched,
//! so the blocking facade must keep the caller's event loop turning while it
//! waits. The caller supplies that loop as an [`EventPump`]; [`wait_until`]
//! drives it until a condition holds or the deadline passes.

use std::time::{Duration, Instant};

use crate::error::SelectionResult;

/// One iteration of the caller's event loop.
///
/// An implementation should dispatch any queued display events (at minimum
/// the selection events) and return. It must not block indefinitely.
pub trait EventPump {
    /// Dispatch pending events once
    fn pump(&mut self) -> SelectionResult<()>;
}

impl<F> EventPump for F
where
    F: FnMut() -> SelectionResult<()>,
{
    fn pump(&mut self) -> SelectionResult<()> {
        self()
    }
}

/// Pump events until `done` returns true or `timeout` elapses.
///
/// Returns `Ok(true)` if the condition was met, `Ok(false)` on timeout.
/// A timeout is an ordinary outcome here; only pump failures are errors.
pub fn wait_until<P, C>(pump: &mut P, timeout: Duration, mut done: C) -> SelectionResult<bool>
where
    P: EventPump,
    C: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        pump.pump()?;
        std::thread::yield_now();
    }
}
