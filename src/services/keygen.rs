//! Storage key derivation.
//!
//! Keys follow `{principal_id}/{millis}-{sanitized_file_name}`. The
//! principal prefix partitions storage per uploader, which downstream
//! access policies depend on; the millisecond timestamp makes concurrent
//! submissions by the same principal collision-free in practice. If two
//! derivations still collide, the gateway fails closed with a key conflict
//! instead of overwriting.

use std::fmt;

use chrono::Utc;

use crate::models::principal::Principal;

/// Source of the submission timestamp.
///
/// Injected so key derivation stays deterministic under test. The clock is
/// the only non-determinism in this module.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall-clock implementation used in production.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A derived storage key.
///
/// Can only be built through [`derive_key`], so every key in circulation
/// is principal-prefixed and free of traversal sequences, control bytes,
/// and stray path separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the storage key for one submission.
///
/// Formula: `{principal_id}/{clock.now_millis()}-{sanitized_file_name}`.
/// Pure given its inputs.
pub fn derive_key(principal: &Principal, file_name: &str, clock: &dyn Clock) -> StorageKey {
    StorageKey(format!(
        "{}/{}-{}",
        sanitize_component(&principal.id, "principal"),
        clock.now_millis(),
        sanitize_file_name(file_name),
    ))
}

/// Strip a declared file name down to something safe to embed in a key.
///
/// The declared name is attacker-controlled: a name like `../../admin/x.jpg`
/// must not be able to escape the principal's key prefix. Only the final
/// path component survives, traversal sequences and control bytes are
/// removed, and an empty result falls back to `document`.
pub fn sanitize_file_name(declared: &str) -> String {
    let last_component = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declared);

    let cleaned: String = last_component
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '\0'))
        .collect();

    let cleaned = cleaned.replace("..", "");
    let cleaned = cleaned.trim_matches(['.', ' ']);

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sanitize a single key component that must not introduce sub-paths.
fn sanitize_component(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '\0'))
        .collect();
    let cleaned = cleaned.replace("..", "");

    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock pinned to a fixed instant.
    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    fn principal(id: &str) -> Principal {
        Principal { id: id.into() }
    }

    #[test]
    fn derives_the_documented_key_shape() {
        let key = derive_key(&principal("user-42"), "front.jpg", &FixedClock(1_700_000_000_000));
        assert_eq!(key.as_str(), "user-42/1700000000000-front.jpg");
    }

    #[test]
    fn distinct_clock_ticks_yield_distinct_keys() {
        let p = principal("user-42");
        let a = derive_key(&p, "front.jpg", &FixedClock(1_700_000_000_000));
        let b = derive_key(&p, "front.jpg", &FixedClock(1_700_000_000_001));
        assert_ne!(a, b);
    }

    #[test]
    fn file_name_keeps_only_the_final_path_component() {
        assert_eq!(sanitize_file_name("holiday/photos/front.jpg"), "front.jpg");
        assert_eq!(sanitize_file_name(r"C:\Users\me\front.jpg"), "front.jpg");
    }

    #[test]
    fn traversal_sequences_cannot_escape_the_principal_prefix() {
        let key = derive_key(&principal("user-42"), "../../other/front.jpg", &FixedClock(1));
        assert_eq!(key.as_str(), "user-42/1-front.jpg");
        assert!(key.as_str().starts_with("user-42/"));
        assert!(!key.as_str().contains(".."));
    }

    #[test]
    fn control_bytes_are_stripped() {
        assert_eq!(sanitize_file_name("fro\nnt\0.jpg"), "front.jpg");
    }

    #[test]
    fn empty_or_hostile_names_fall_back_to_a_placeholder() {
        assert_eq!(sanitize_file_name(""), "document");
        assert_eq!(sanitize_file_name("../.."), "document");
        assert_eq!(sanitize_file_name("..."), "document");
    }

    #[test]
    fn system_clock_is_monotonic_enough_for_millis() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }
}
