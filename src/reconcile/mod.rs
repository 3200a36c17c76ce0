//! Time reconciliation on both ends of the stream
//!
//! [`Stamper`] runs after the encoder and prepends a timestamp SEI to each
//! keyframe. [`Reconciler`] runs after the decoder's parser and turns capture
//! timestamps into display times on the local clock: absolute when a record
//! and a clock offset are available, otherwise the last known linear mapping.
//!
//! Both own their per-session state and are driven by a single thread; the
//! time reference can be inline ([`crate::ntp::ScheduledSync`]) or
//! backgrounded ([`crate::ntp::BackgroundSync`]).

mod receiver;
mod stamper;

pub use receiver::{Reconciler, ReceiverStats, ReconcilerState};
pub use stamper::{Stamper, StamperStats};
