//! Shared kernel test harness.
//!
//! [`optester`] runs one node end to end against the shared registry and
//! checks its outputs. [`stream`] is a deliberately asynchronous test
//! provider for exercising fences and the asynchronous compute path.

pub mod optester;
pub mod stream;

pub use optester::OpTester;
