//! Common test utilities for stateful scenes

mod test_hass;

pub use test_hass::*;
