//! Request locale resolution and translation.
//!
//! A request has an i18n context only when a [`Translator`] is configured.
//! Without one every lookup reports "untranslated" and callers fall back to
//! literal or default messages.

use std::sync::Arc;

use super::ports::Translator;

/// Locale hints carried by a request, most specific first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocaleHints<'a> {
    /// `lang` query parameter.
    pub query: Option<&'a str>,
    /// `x-lang` header.
    pub header: Option<&'a str>,
    /// Raw `Accept-Language` header.
    pub accept_language: Option<&'a str>,
}

/// Resolves request locales against a translator's catalogue.
#[derive(Clone)]
pub struct Localizer {
    translator: Option<Arc<dyn Translator>>,
    default_locale: String,
}

impl Localizer {
    /// Localizer backed by `translator`.
    pub fn new(translator: Arc<dyn Translator>, default_locale: impl Into<String>) -> Self {
        Self {
            translator: Some(translator),
            default_locale: default_locale.into(),
        }
    }

    /// Localizer that never translates.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            translator: None,
            default_locale: String::from("en"),
        }
    }

    /// Build the i18n context for a request, if translation is enabled.
    ///
    /// Hints are tried in order: `lang`, `x-lang`, then the first
    /// `Accept-Language` tag. Each is matched exactly, then by its primary
    /// subtag. When nothing matches the default locale is used.
    #[must_use]
    pub fn context(&self, hints: LocaleHints<'_>) -> Option<I18nContext<'_>> {
        let translator = self.translator.as_deref()?;
        let first_accept = hints.accept_language.and_then(first_language_tag);
        let locale = [hints.query, hints.header, first_accept]
            .into_iter()
            .flatten()
            .find_map(|hint| match_locale(translator, hint))
            .unwrap_or_else(|| self.default_locale.clone());
        Some(I18nContext { translator, locale })
    }
}

impl std::fmt::Debug for Localizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Localizer")
            .field("enabled", &self.translator.is_some())
            .field("default_locale", &self.default_locale)
            .finish()
    }
}

fn first_language_tag(header: &str) -> Option<&str> {
    header
        .split(',')
        .next()
        .and_then(|tag| tag.split(';').next())
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "*")
}

fn match_locale(translator: &dyn Translator, hint: &str) -> Option<String> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    if translator.supports(hint) {
        return Some(hint.to_owned());
    }
    let primary = hint.split(['-', '_']).next().unwrap_or(hint);
    let candidates = translator.locales();
    candidates
        .iter()
        .find(|locale| locale.eq_ignore_ascii_case(hint))
        .or_else(|| {
            candidates.iter().find(|locale| {
                locale
                    .split(['-', '_'])
                    .next()
                    .is_some_and(|p| p.eq_ignore_ascii_case(primary))
            })
        })
        .cloned()
}

/// Translation context bound to one request's locale.
#[derive(Clone)]
pub struct I18nContext<'a> {
    translator: &'a dyn Translator,
    locale: String,
}

impl<'a> I18nContext<'a> {
    /// Context for `locale` without hint resolution.
    pub fn new(translator: &'a dyn Translator, locale: impl Into<String>) -> Self {
        Self {
            translator,
            locale: locale.into(),
        }
    }

    /// Resolved locale.
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Translate `key`, or `None` when the catalogue has no distinct entry.
    #[must_use]
    pub fn translate(&self, key: &str) -> Option<String> {
        self.translator
            .lookup(key, &self.locale)
            .filter(|translated| translated != key)
    }
}

/// Translate `key` when an i18n context exists.
#[must_use]
pub fn translate(context: Option<&I18nContext<'_>>, key: &str) -> Option<String> {
    context.and_then(|ctx| ctx.translate(key))
}
