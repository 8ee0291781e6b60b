//! Lua scripts for versioned Redis writes.
//!
//! Each record lives at `KEYS[1]` with its version counter at `KEYS[2]`
//! (`{key}:version`). Running the compare and the write inside one script
//! makes the conditional put atomic on the Redis side.

/// Sentinel passed as the expected version when the key must be absent.
pub const EXPECT_ABSENT: &str = "absent";

/// Lua script for a conditional (compare-and-set) write.
///
/// Arguments:
/// - KEYS[1]: Data key (e.g., `session:{meeting_id}`)
/// - KEYS[2]: Version key (e.g., `session:{meeting_id}:version`)
/// - ARGV[1]: Expected version, or `absent`
/// - ARGV[2]: Value to write
///
/// Returns:
/// - N >= 1: Success, N is the new version
/// - 0: Conflict (version mismatch or key already exists)
/// - -1: Error (invalid expected version)
pub const CONDITIONAL_PUT: &str = r#"
if ARGV[1] == 'absent' then
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
else
    local expected = tonumber(ARGV[1])
    if expected == nil then
        return -1
    end

    -- Values written without a version counter read as version 0
    local current = tonumber(redis.call('GET', KEYS[2]) or '0')
    if current == nil then
        return -1
    end

    if redis.call('EXISTS', KEYS[1]) == 0 or current ~= expected then
        return 0
    end
end

redis.call('SET', KEYS[1], ARGV[2])
return redis.call('INCR', KEYS[2])
"#;

/// Lua script for an unconditional write that still bumps the version.
///
/// Arguments:
/// - KEYS[1]: Data key
/// - KEYS[2]: Version key
/// - ARGV[1]: Value to write
///
/// Returns:
/// - New version
pub const VERSIONED_PUT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1])
return redis.call('INCR', KEYS[2])
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditional_put_checks_absent_sentinel() {
        assert!(CONDITIONAL_PUT.contains(&format!("'{EXPECT_ABSENT}'")));
        assert!(CONDITIONAL_PUT.contains("EXISTS"));
    }

    #[test]
    fn test_scripts_bump_version() {
        assert!(CONDITIONAL_PUT.contains("INCR"));
        assert!(VERSIONED_PUT.contains("INCR"));
    }
}
