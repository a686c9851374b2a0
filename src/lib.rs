pub mod config;
pub mod connection;
pub mod device;
pub mod errors;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod sink;
pub mod telemetry;

/// Fixture and stream-builder helpers shared by the library's own unit tests
/// and the `tests/` integration crate.
///
/// This module is compiled unconditionally (not `#[cfg(test)]`) because a
/// separate integration test binary cannot see items gated on the library's
/// own test configuration.
pub mod test_support;
