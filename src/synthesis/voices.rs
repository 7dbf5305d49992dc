//! Voice catalogue and selection

use serde::{Deserialize, Serialize};

/// A voice offered by the speech engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Engine-specific voice name or identifier
    pub name: String,
    /// BCP 47 language tag (e.g. "en-US")
    pub lang: String,
    /// Rendered by the engine itself rather than a third-party service
    pub local_service: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>, local_service: bool) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            local_service,
        }
    }

    /// Whether this voice speaks `language` ("en" matches "en-GB")
    #[must_use]
    pub fn speaks(&self, language: &str) -> bool {
        let lang = self.lang.to_ascii_lowercase().replace('_', "-");
        let wanted = language.to_ascii_lowercase().replace('_', "-");
        lang == wanted || lang.starts_with(&format!("{wanted}-"))
    }
}

/// Pick the voice to use from `voices`
///
/// An explicitly configured name wins when offered, then the first local
/// voice in `language`, then whatever comes first.
#[must_use]
pub fn preferred_voice<'a>(
    voices: &'a [Voice],
    language: &str,
    configured: Option<&str>,
) -> Option<&'a Voice> {
    configured
        .and_then(|name| voices.iter().find(|v| v.name == name))
        .or_else(|| voices.iter().find(|v| v.local_service && v.speaks(language)))
        .or_else(|| voices.first())
}
