//! Helpers shared by the supervisor and gateway integration tests.
//!
//! `mock_controller` scripts node processes, `fixtures` builds configs, TLS
//! directories and wired-up supervisors, and `assertions` waits on broadcast
//! events with a timeout.

pub mod assertions;
pub mod fixtures;
pub mod mock_controller;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_controller::*;
