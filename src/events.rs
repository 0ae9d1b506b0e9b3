//! Event definitions for the monitor event loop.
//!
//! All state transitions are driven through this enum: script process
//! updates, user input, and host signals are delivered over one mpsc
//! channel and handled on a single logical flow of control.

use crossterm::event::KeyEvent;

use crate::output::StreamKind;

/// An event in the monitor's main loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// The spawned process is up, with its OS pid.
    RunStarted { pid: u32 },
    /// A chunk of stdout/stderr arrived from the running script.
    RunOutput { text: String, stream: StreamKind },
    /// The script process exited (None usually means killed by signal).
    RunExited { code: Option<i32> },
    /// Spawning failed or the process hit a runtime error.
    RunFailed { error: String },
    /// A keyboard event from the terminal.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// The host asked us to shut down (Ctrl-C / SIGTERM).
    Shutdown,
}
