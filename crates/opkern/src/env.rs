use std::env;
use std::sync::OnceLock;
use std::time::Duration;

static OPKERN_FENCE_DEADLINE_MS: OnceLock<Option<u64>> = OnceLock::new();
static OPKERN_NO_BUFFER_REUSE: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Optional upper bound on blocking fence waits, in milliseconds.
///
/// Unset means wait forever. Setting `OPKERN_FENCE_DEADLINE_MS` turns a
/// deadlocked wait into a panic that names the stuck queue, which is the
/// behavior wanted when debugging scheduling problems.
pub(crate) fn fence_wait_deadline() -> Option<Duration> {
    OPKERN_FENCE_DEADLINE_MS
        .get_or_init(|| match env::var("OPKERN_FENCE_DEADLINE_MS") {
            Ok(value) => value.trim().parse::<u64>().ok(),
            _ => None,
        })
        .map(Duration::from_millis)
}

/// Disables planned-buffer reuse in execution frames when set.
///
/// `OPKERN_NO_BUFFER_REUSE=1` forces every output tensor through a fresh
/// allocation, which isolates corruption bugs from the reuse plan.
pub(crate) fn buffer_reuse_disabled() -> bool {
    *OPKERN_NO_BUFFER_REUSE.get_or_init(|| match env::var("OPKERN_NO_BUFFER_REUSE") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
