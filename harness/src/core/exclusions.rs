//! Language-level directory exclusion rules.

/// Documentation and meta directories that never hold templates.
pub const BUILTIN_EXCLUDES: &[&str] = &["docs", "hack", "scripts", "test", "target", "node_modules"];

/// Whether a first-level directory name should be skipped during discovery.
///
/// Hidden directories (leading `.`) are always skipped; `extra` extends the
/// built-in set.
pub fn is_excluded(name: &str, extra: &[String]) -> bool {
    if name.starts_with('.') {
        return true;
    }
    BUILTIN_EXCLUDES.contains(&name) || extra.iter().any(|entry| entry == name)
}
