//! Main entry point for Rewind

#![deny(warnings, missing_docs, trivial_casts, unused_qualifications)]
#![forbid(unsafe_code)]

use i18n_embed::DesktopLanguageRequester;

/// Boot Rewind
fn main() {
    rewind::application::boot(DesktopLanguageRequester::requested_languages());
}
