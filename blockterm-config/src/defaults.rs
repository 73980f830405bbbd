//! Default value functions for configuration.
//!
//! Used as `#[serde(default = "crate::defaults::...")]` attributes on
//! `Config` fields so that partial YAML files fill in the rest.

pub fn cols() -> u16 {
    80
}

pub fn rows() -> u16 {
    24
}

pub fn scrollback_bytes() -> usize {
    1024 * 1024 // 1 MiB per session
}

pub fn max_blocks() -> usize {
    1000
}

pub fn kill_grace_ms() -> u64 {
    750
}

pub fn login_shell() -> bool {
    true
}

pub fn restore_session() -> bool {
    true
}

pub fn bool_false() -> bool {
    false
}

pub fn shell_integration() -> bool {
    true
}
