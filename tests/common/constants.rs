//! Shared constants for end-to-end tests

// ============================================================================
// Identity
// ============================================================================

/// HS256 secret shared by the test API server and token helpers
pub const TEST_SIGNING_SECRET: &str = "test-signing-secret";

/// Subject of tokens issued in tests
pub const TEST_SUBJECT: &str = "recruiter-42";

// ============================================================================
// Jobs
// ============================================================================

/// Name of the blocking job registered in the test batch server
pub const BLOCKING_JOB: &str = "blocking_probe";

/// Name of the quick job registered in the test batch server
pub const QUICK_JOB: &str = "quick_probe";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for a test server to accept requests
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Per-request timeout of the test HTTP client
pub const REQUEST_TIMEOUT_SECS: u64 = 5;
