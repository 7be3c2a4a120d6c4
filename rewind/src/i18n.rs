use std::sync::LazyLock;

use i18n_embed::{
    fluent::{FluentLanguageLoader, fluent_language_loader},
    unic_langid::LanguageIdentifier,
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "i18n"]
struct Localizations;

pub(crate) static LANGUAGE_LOADER: LazyLock<FluentLanguageLoader> =
    LazyLock::new(|| fluent_language_loader!());

/// Loads the best match for `requested_languages` out of the languages bundled in
/// `rewind/i18n/`, falling back to `en-US`.
///
/// Returns the languages that were loaded.
pub(crate) fn load_languages(
    requested_languages: &[LanguageIdentifier],
) -> Vec<LanguageIdentifier> {
    let supported_languages =
        i18n_embed::select(&*LANGUAGE_LOADER, &Localizations, requested_languages)
            .expect("bundled translations are valid Fluent");
    // Common Windows terminals render Unicode Directionality Isolation Marks literally.
    LANGUAGE_LOADER.set_use_isolating(false);
    supported_languages
}
