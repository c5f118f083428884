use std::time::Duration;

/// Engine tunables. Defaults suit a 60 fps terminal loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub debounce: Duration,
    pub reveal_chunk: usize,
    pub focus_attempts: u32,
    pub settle_checks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            reveal_chunk: 24,
            focus_attempts: 120,
            settle_checks: 2,
        }
    }
}

fn env_num<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl EngineConfig {
    /// Defaults overridden by `FORMDECK_*` variables; unparsable values are
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let num = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let d = Self::default();
        Self {
            debounce: num("FORMDECK_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.debounce),
            reveal_chunk: num("FORMDECK_REVEAL_CHUNK")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(d.reveal_chunk),
            focus_attempts: num("FORMDECK_FOCUS_ATTEMPTS")
                .filter(|n| *n > 0)
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(d.focus_attempts),
            settle_checks: num("FORMDECK_SETTLE_CHECKS")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(d.settle_checks),
        }
    }
}

/// True when `FORMDECK_HEADLESS` is set to a truthy value.
pub fn headless() -> bool {
    matches!(
        std::env::var("FORMDECK_HEADLESS").ok().as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Frames drawn in headless mode before submitting (`FORMDECK_TICKS`).
pub fn headless_ticks() -> u64 {
    env_num("FORMDECK_TICKS").unwrap_or(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("FORMDECK_DEBOUNCE_MS", "40"),
            ("FORMDECK_REVEAL_CHUNK", "0"),
            ("FORMDECK_FOCUS_ATTEMPTS", "abc"),
            ("FORMDECK_SETTLE_CHECKS", " 3 "),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| env.get(k).map(|s| s.to_string()));
        assert_eq!(cfg.debounce, Duration::from_millis(40));
        assert_eq!(cfg.reveal_chunk, 24);
        assert_eq!(cfg.focus_attempts, 120);
        assert_eq!(cfg.settle_checks, 3);
        assert_eq!(EngineConfig::from_lookup(|_| None), EngineConfig::default());
    }
}
