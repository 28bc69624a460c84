//! Test utilities for building programs against the test targets.
//!
//! Fixtures build argument trees that match the test/64 (or test/32)
//! descriptions exactly, so every group they return satisfies the size
//! invariants checked by traversal and squashing.
