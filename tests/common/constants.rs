//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.

// ============================================================================
// Test Identities
// ============================================================================

/// Regular test user id, sent in the X-User-Id header
pub const TEST_USER: &str = "test-user-1";

/// A second user, for cross-user access checks
pub const OTHER_USER: &str = "test-user-2";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a detailed analysis job to finish (milliseconds)
pub const JOB_DONE_TIMEOUT_MS: u64 = 15_000;

/// Polling interval when waiting for a job to finish (milliseconds)
pub const JOB_POLL_INTERVAL_MS: u64 = 100;
