//! Bridge from a blocking command body to the async event loop.
//!
//! ```text
//!   invoking thread                         body thread
//!   ───────────────                         ───────────
//!   spawn(body) ──────────────────────────► body(&invocation)
//!   eventloop:                                 │ publish events ──► bus
//!     select! {                                │
//!       outcome ◄───── error, then close ──────┘
//!       bus events ──► ui.handle
//!       cancellation
//!     }
//!   ui.teardown
//! ```

mod bridge;
mod eventloop;

pub use bridge::{spawn, Outcome};
pub use eventloop::eventloop;
