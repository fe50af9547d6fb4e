//! Loopback integration tests for SwarmLink
//!
//! This test suite validates:
//! - Queries and replies over real TCP connections
//! - Motor command gating by binding
//! - Decode error recovery and registry bookkeeping
//! - Console relay to discovered units
//! - Beacon flow from a unit's control loop into the console roster

pub mod test_utils;

#[cfg(test)]
mod link_tests;

#[cfg(test)]
mod relay_tests;

#[cfg(test)]
mod broadcast_tests;
