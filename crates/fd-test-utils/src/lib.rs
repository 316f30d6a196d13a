// fd-test-utils: shared test utilities for the fetchd suite.
//
// Provides a scriptable fake engine so integration tests can drive the
// daemon's publish path without touching the network.

pub mod fake_engine;

pub use fake_engine::FakeEngine;
