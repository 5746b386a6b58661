//! Failure taxonomy for analysis requests.
//!
//! Generation backends fail with loosely structured values. [`classify`] is
//! the single place where those shapes are inspected. Everything downstream
//! works with [`ErrorInfo`] only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::language::{detect, localize, Language};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ApiKeyInvalid,
    RateLimited,
    ModelUnavailable,
    NotConfigured,
    Unknown,
}

/// A classified failure with its user-facing, localized message.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, language: Language) -> Self {
        Self {
            kind,
            message: message_for(kind, language).to_string(),
            retry_after_secs: None,
        }
    }

    pub fn not_configured(language: Language) -> Self {
        Self::new(ErrorKind::NotConfigured, language)
    }

    pub fn rate_limited(retry_after_secs: u64, language: Language) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(ErrorKind::RateLimited, language)
        }
    }

    /// Re-renders the message for another language, keeping kind and retry hint.
    pub fn localized(self, language: Language) -> Self {
        Self {
            message: message_for(self.kind, language).to_string(),
            ..self
        }
    }
}

pub fn message_for(kind: ErrorKind, language: Language) -> &'static str {
    match kind {
        ErrorKind::ApiKeyInvalid => localize(
            "API klíč není platný. Zadejte prosím platný API klíč.",
            "API key not valid. Please pass a valid API key.",
            language,
        ),
        ErrorKind::RateLimited => localize(
            "Příliš mnoho požadavků. Prosím počkejte minutu před dalším pokusem.",
            "Too many requests. Please wait a minute before trying again.",
            language,
        ),
        ErrorKind::ModelUnavailable => localize(
            "API model není dostupný. Zkuste to prosím později.",
            "API model not available. Please try again later.",
            language,
        ),
        ErrorKind::NotConfigured => localize(
            "API klíč není nastaven. Prosím nastavte Gemini API klíč v nastavení rozšíření.",
            "API key not set. Please set your Gemini API key in the extension popup.",
            language,
        ),
        ErrorKind::Unknown => localize(
            "Chyba při analýze. Zkuste to prosím později.",
            "Error analyzing text. Please try again later.",
            language,
        ),
    }
}

/// Fields pulled out of a raw failure before kind selection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawErrorFields {
    pub message: String,
    pub status: String,
    pub code: i64,
    pub api_key_invalid: bool,
}

const INVALID_KEY_MARKERS: [&str; 2] = ["API key not valid", "API_KEY_INVALID"];
const RATE_LIMIT_MARKERS: [&str; 3] = ["429", "quota", "Rate limit"];
const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

pub fn extract(raw: &Value) -> RawErrorFields {
    let mut fields = RawErrorFields::default();

    match raw {
        Value::String(message) => fields.message = message.clone(),
        Value::Object(object) => match object.get("error") {
            Some(Value::String(message)) => fields.message = message.clone(),
            Some(Value::Object(body)) => {
                fields.message = str_field(body.get("message")).unwrap_or_default();
                fields.status = str_field(body.get("status")).unwrap_or_default();
                fields.code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
                let details = body.get("details").and_then(Value::as_array);
                for detail in details.into_iter().flatten() {
                    if detail.get("reason").and_then(Value::as_str) == Some("API_KEY_INVALID") {
                        fields.api_key_invalid = true;
                    }
                    let localized = detail
                        .get("@type")
                        .and_then(Value::as_str)
                        .is_some_and(|kind| kind.contains("LocalizedMessage"));
                    if let (true, Some(message)) = (localized, str_field(detail.get("message"))) {
                        fields.message = message;
                    }
                }
            }
            _ => {
                if let Some(message) = str_field(object.get("message")) {
                    fields.message = message;
                } else if let (Some(name), Some(description)) =
                    (str_field(object.get("name")), str_field(object.get("description")))
                {
                    fields.message = format!("{name}: {description}");
                } else {
                    fields.message = raw.to_string();
                }
            }
        },
        other => fields.message = other.to_string(),
    }

    fields.api_key_invalid = fields.api_key_invalid
        || INVALID_KEY_MARKERS
            .iter()
            .any(|marker| fields.message.contains(marker))
        || fields.status == INVALID_ARGUMENT
        || fields.code == 400;
    fields
}

pub fn classify(raw: &Value, analyzed_text: &str) -> ErrorInfo {
    let fields = extract(raw);
    let kind = if fields.api_key_invalid {
        ErrorKind::ApiKeyInvalid
    } else if fields.code == 429
        || RATE_LIMIT_MARKERS
            .iter()
            .any(|marker| fields.message.contains(marker))
    {
        ErrorKind::RateLimited
    } else if fields.code == 404 || fields.message.contains("404") {
        ErrorKind::ModelUnavailable
    } else {
        ErrorKind::Unknown
    };
    ErrorInfo::new(kind, detect(analyzed_text))
}

fn str_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
