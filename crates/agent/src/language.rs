//! Response-language directive appended to the system prompt.

use nupi_adapter_core::config::{LANGUAGE_AUTO, LANGUAGE_CLIENT};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Request metadata key carrying the client's language as an English name.
pub const LANGUAGE_METADATA_KEY: &str = "nupi.lang.english";

const AUTO_INSTRUCTION: &str =
    "Detect the language of the user's message and respond in the same language.";

static LANGUAGE_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("en", "English"),
        ("pl", "Polish"),
        ("de", "German"),
        ("fr", "French"),
        ("es", "Spanish"),
        ("it", "Italian"),
        ("pt", "Portuguese"),
        ("nl", "Dutch"),
        ("cs", "Czech"),
        ("sk", "Slovak"),
        ("uk", "Ukrainian"),
        ("ru", "Russian"),
        ("sv", "Swedish"),
        ("no", "Norwegian"),
        ("da", "Danish"),
        ("fi", "Finnish"),
        ("ja", "Japanese"),
        ("zh", "Chinese"),
        ("ko", "Korean"),
        ("tr", "Turkish"),
        ("el", "Greek"),
        ("hu", "Hungarian"),
        ("ro", "Romanian"),
        ("he", "Hebrew"),
        ("ar", "Arabic"),
        ("hi", "Hindi"),
    ])
});

static LANGUAGE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]{2})(?:[-_][a-z0-9]+)?$").expect("valid language regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageMode {
    /// Follow the language the client reports in request metadata.
    Client,
    /// Let the model mirror the user's language.
    Auto,
    /// Always answer in this language (display name or raw value).
    Fixed(String),
}

impl LanguageMode {
    /// Expects the already-normalized (trimmed, lower-cased) config value.
    pub fn parse(configured: &str) -> Self {
        match configured {
            "" | LANGUAGE_CLIENT => Self::Client,
            LANGUAGE_AUTO => Self::Auto,
            other => Self::Fixed(display_name(other)),
        }
    }
}

/// `pl` and `pl-PL` become "Polish", unknown codes are upper-cased, anything
/// that is not a code is used verbatim.
fn display_name(value: &str) -> String {
    match LANGUAGE_CODE.captures(&value.to_lowercase()) {
        Some(caps) => {
            let code = &caps[1];
            LANGUAGE_NAMES
                .get(code)
                .map(|name| name.to_string())
                .unwrap_or_else(|| code.to_uppercase())
        }
        None => value.to_string(),
    }
}

/// The instruction to append for this request, or an empty string.
pub fn resolve_language_instruction(configured: &str, metadata: &HashMap<String, String>) -> String {
    match LanguageMode::parse(configured) {
        LanguageMode::Client => match metadata.get(LANGUAGE_METADATA_KEY).map(|l| l.trim()) {
            Some(name) if !name.is_empty() => format!("Always respond in {}.", name),
            _ => String::new(),
        },
        LanguageMode::Auto => AUTO_INSTRUCTION.to_string(),
        LanguageMode::Fixed(name) => {
            format!("Always respond in {} regardless of the input language.", name)
        }
    }
}
