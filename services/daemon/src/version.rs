//! Build identity reported by `system.getVersion`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit hash baked in by the release pipeline, when present.
pub fn commit() -> Option<&'static str> {
    option_env!("FETCHD_BUILD_COMMIT")
}

/// Build type (`release`, `nightly`, …) baked in by the release pipeline.
pub fn build_type() -> Option<&'static str> {
    option_env!("FETCHD_BUILD_TYPE")
}
