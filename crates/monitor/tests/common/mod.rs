//! Fakes for the consumer tests: a gateway link that records requests and
//! a network status source that answers from a script.

pub mod fake_link;
pub mod scripted_source;

#[allow(unused_imports)]
pub use fake_link::*;
#[allow(unused_imports)]
pub use scripted_source::*;
