//! Driven port for message catalogue lookups.

/// Resolves translation keys for a locale.
///
/// Implementations return the key itself (or `None`) when no entry exists;
/// callers treat both as "untranslated".
#[cfg_attr(test, mockall::automock)]
pub trait Translator: Send + Sync {
    /// Look up `key` in `locale`.
    fn lookup(&self, key: &str, locale: &str) -> Option<String>;

    /// Whether the catalogue carries `locale`.
    fn supports(&self, locale: &str) -> bool;

    /// Locales the catalogue carries.
    fn locales(&self) -> Vec<String>;
}
