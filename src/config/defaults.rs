//! Default value functions for configuration.

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_cors_allow_any_origin() -> bool {
    true
}

// =============================================================================
// Grant Defaults
// =============================================================================

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_lock_timeout_ms() -> u64 {
    250
}
