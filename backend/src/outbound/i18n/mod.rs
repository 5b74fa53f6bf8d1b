//! JSON message catalogue implementing the [`Translator`] port.
//!
//! Each locale is a flat JSON object mapping message keys to text. The
//! catalogues under `backend/locales/` are compiled into the binary and
//! loaded with [`JsonCatalogue::embedded`].

use std::collections::HashMap;

use crate::domain::ports::Translator;

const EMBEDDED: &[(&str, &str)] = &[
    ("en", include_str!("../../../locales/en.json")),
    ("zh-CN", include_str!("../../../locales/zh-CN.json")),
];

/// Failures while loading a catalogue.
#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    /// A locale file was not a flat object of strings.
    #[error("invalid catalogue for locale {locale}: {source}")]
    Parse {
        locale: String,
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory catalogue keyed by locale then message key.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalogue {
    locales: HashMap<String, HashMap<String, String>>,
}

impl JsonCatalogue {
    /// Catalogue of the locales shipped with the backend.
    ///
    /// # Examples
    /// ```
    /// use storefront::domain::ports::Translator;
    /// use storefront::outbound::i18n::JsonCatalogue;
    ///
    /// let catalogue = JsonCatalogue::embedded().expect("shipped catalogues parse");
    /// assert_eq!(
    ///     catalogue.lookup("internalServerError", "en").as_deref(),
    ///     Some("Internal server error")
    /// );
    /// ```
    pub fn embedded() -> Result<Self, CatalogueError> {
        Self::from_sources(EMBEDDED.iter().copied())
    }

    /// Parse `(locale, json)` pairs.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, CatalogueError> {
        let locales = sources
            .into_iter()
            .map(|(locale, raw)| {
                serde_json::from_str::<HashMap<String, String>>(raw)
                    .map(|entries| (locale.to_owned(), entries))
                    .map_err(|source| CatalogueError::Parse {
                        locale: locale.to_owned(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { locales })
    }
}

impl Translator for JsonCatalogue {
    fn lookup(&self, key: &str, locale: &str) -> Option<String> {
        self.locales.get(locale)?.get(key).cloned()
    }

    fn supports(&self, locale: &str) -> bool {
        self.locales.contains_key(locale)
    }

    fn locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.locales.keys().cloned().collect();
        locales.sort();
        locales
    }
}
