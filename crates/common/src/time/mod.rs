//! Time utilities and abstractions
//!
//! - **[`clock`]**: real and mock time sources
//! - **[`timer`]**: one-shot and recurring timers with cancellable handles
//!
//! ```rust
//! use std::time::Duration;
//!
//! use devicegate_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let before = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert!(clock.now() > before);
//! ```

pub mod clock;
pub mod timer;

pub use clock::{Clock, MockClock, SystemClock};
pub use timer::{recurring, schedule_once, TimerHandle};
