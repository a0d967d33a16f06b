//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::models::SessionRecord;

/// Validate a freshly written or extended session record
pub fn assert_record_invariants(record: &SessionRecord) {
    debug_assert!(
        !record.token.is_empty(),
        "Session for {} has an empty token",
        record.user.email
    );

    debug_assert!(
        record.last_activity_time >= record.login_time,
        "Session for {} has activity {} before login {}",
        record.user.email,
        record.last_activity_time,
        record.login_time
    );
}

/// Validate that a timer is never armed past the window it guards
pub fn assert_delay_within(delay: Duration, window: Duration, context: &str) {
    debug_assert!(
        delay <= window,
        "Timer delay {:?} exceeds window {:?} in {}",
        delay,
        window,
        context
    );
}

/// Validate that an extension moved the absolute deadline forward
pub fn assert_extension_advances(
    old_login: chrono::DateTime<chrono::Utc>,
    new_login: chrono::DateTime<chrono::Utc>,
) {
    debug_assert!(
        new_login > old_login,
        "Extension did not advance login time: {} -> {}",
        old_login,
        new_login
    );
}

/// Validate the relationship between configured windows
pub fn assert_config_invariants(config: &SessionConfig) {
    debug_assert!(
        config.warning_window < config.absolute_timeout,
        "Warning window {:?} not shorter than absolute timeout {:?}",
        config.warning_window,
        config.absolute_timeout
    );
}
