//! Output shape checks shared by the CLI subcommands and the HTTP server.
//!
//! Every check decodes the raw payload itself and never fails by panicking:
//! the result is always a [`ValidationOutcome`] carrying the offending payload,
//! so callers can report it verbatim and abort the run.

use serde_json::{Map, Value};

use crate::Error;

/// Which output contract a payload must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// `languages` subcommand: `[{lang_code, articles[]}]`.
    Languages,
    /// `news` subcommand: `{articles[]}`.
    News,
    /// `categories` subcommand: `[{category, articles[]}]`.
    Categories,
    /// `threads` subcommand: `[{title, articles[]}]`.
    Threads,
    /// `GET /threads`: `{threads: [{title, category?, articles[]}]}`.
    ///
    /// `require_category` is set when the query asked for `category=any`.
    RankedThreads { require_category: bool },
}

/// Why a payload failed to decode, mirroring the decoder's error classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    DepthExceeded,
    MalformedUtf8,
    ControlCharacter,
    /// Anything else the parser rejects, truncated input included.
    Syntax(String),
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeFailure::DepthExceeded => write!(f, "The maximum stack depth has been exceeded"),
            DecodeFailure::MalformedUtf8 => write!(
                f,
                "Malformed UTF-8 characters, possibly incorrectly encoded"
            ),
            DecodeFailure::ControlCharacter => write!(
                f,
                "Control character error, possibly incorrectly encoded"
            ),
            DecodeFailure::Syntax(detail) => write!(f, "Syntax error ({detail})"),
        }
    }
}

/// A payload that broke its contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub reason: String,
    pub payload: String,
}

/// Result of validating one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(SchemaViolation),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    pub fn violation(&self) -> Option<&SchemaViolation> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid(violation) => Some(violation),
        }
    }

    /// Convert into the run's error type.
    pub fn into_result(self) -> crate::Result<()> {
        match self {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Invalid(SchemaViolation { reason, payload }) => {
                Err(Error::Schema { reason, payload })
            }
        }
    }
}

/// Decode `raw` as JSON, classifying failures.
pub fn decode(raw: &[u8]) -> Result<Value, DecodeFailure> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeFailure::MalformedUtf8)?;

    serde_json::from_str(text).map_err(|e| {
        let message = e.to_string();
        if message.starts_with("recursion limit exceeded") {
            DecodeFailure::DepthExceeded
        } else if message.starts_with("control character") {
            DecodeFailure::ControlCharacter
        } else {
            DecodeFailure::Syntax(message)
        }
    })
}

/// Decode and check `raw` against `kind`.
pub fn validate(kind: PayloadKind, raw: &[u8]) -> ValidationOutcome {
    let value = match decode(raw) {
        Ok(value) => value,
        Err(failure) => {
            return invalid(
                format!("JSON decoding failed with error: {failure}"),
                raw,
            )
        }
    };

    match check_shape(kind, &value) {
        Ok(()) => ValidationOutcome::Valid,
        Err(detail) => invalid(format!("Invalid output format: {detail}"), raw),
    }
}

fn invalid(reason: String, raw: &[u8]) -> ValidationOutcome {
    ValidationOutcome::Invalid(SchemaViolation {
        reason,
        payload: String::from_utf8_lossy(raw).into_owned(),
    })
}

fn check_shape(kind: PayloadKind, value: &Value) -> Result<(), &'static str> {
    match kind {
        PayloadKind::Languages => check_groups(value, "lang_code", "lang_code missed"),
        PayloadKind::Categories => check_groups(value, "category", "category missed"),
        PayloadKind::Threads => check_groups(value, "title", "title missed"),
        PayloadKind::News => {
            let object = value.as_object().ok_or("result should be an object")?;
            check_articles(object)
        }
        PayloadKind::RankedThreads { require_category } => {
            check_ranked(value, require_category)
        }
    }
}

/// Arrays of `{<key>, articles[]}` objects.
fn check_groups(value: &Value, key: &str, missing: &'static str) -> Result<(), &'static str> {
    let items = value.as_array().ok_or("result should be an array")?;
    for item in items {
        let object = item.as_object().ok_or("array item should be an object")?;
        if !is_set(object, key) {
            return Err(missing);
        }
        check_articles(object)?;
    }
    Ok(())
}

fn check_ranked(value: &Value, require_category: bool) -> Result<(), &'static str> {
    let object = value.as_object().ok_or("result should be an object")?;
    if !is_set(object, "threads") {
        return Err("threads missed");
    }
    let threads = object["threads"]
        .as_array()
        .ok_or("threads should be an array")?;

    for thread in threads {
        let thread = thread.as_object().ok_or("thread item should be an object")?;
        if !is_set(thread, "title") {
            return Err("title missed");
        }
        if require_category && !is_set(thread, "category") {
            return Err("category missed (required for category=any)");
        }
        check_articles(thread)?;
    }
    Ok(())
}

fn check_articles(object: &Map<String, Value>) -> Result<(), &'static str> {
    if !is_set(object, "articles") {
        return Err("articles missed");
    }
    let articles = object["articles"]
        .as_array()
        .ok_or("articles should be an array")?;

    if articles.iter().all(is_file_name) {
        Ok(())
    } else {
        Err("article should be a file name")
    }
}

/// Present and not `null`.
fn is_set(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).is_some_and(|v| !v.is_null())
}

fn is_file_name(article: &Value) -> bool {
    article.as_str().is_some_and(|name| !name.contains('/'))
}
