// # Run Lock Implementations
//
// This module provides implementations of the RunLock trait.

pub mod file;

pub use file::{FileRunLock, LockHolder};
