//! Subject naming rules.
//!
//! Subjects are dot-separated tokens. `*` matches one token and `>` matches
//! the remaining tokens; both must stand alone as a token and `>` must be last.

use thiserror::Error;

/// Why a subject was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("subject is empty")]
    Empty,

    #[error("subject contains whitespace or control characters")]
    InvalidCharacter,

    #[error("subject contains an empty token")]
    EmptyToken,

    #[error("wildcards are not allowed here")]
    WildcardNotAllowed,

    #[error("malformed wildcard token '{0}'")]
    MalformedWildcard(String),
}

/// Turn a URL path remainder into a subject: `orders/eu/created` → `orders.eu.created`.
pub fn subject_from_path(raw: &str) -> String {
    raw.trim_matches('/').replace('/', ".")
}

/// Check `subject` against the naming rules.
pub fn validate(subject: &str, allow_wildcards: bool) -> Result<(), SubjectError> {
    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }
    if subject.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SubjectError::InvalidCharacter);
    }

    let tokens: Vec<&str> = subject.split('.').collect();
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(SubjectError::EmptyToken);
        }
        let has_wildcard = token.contains('*') || token.contains('>');
        if !has_wildcard {
            continue;
        }
        if !allow_wildcards {
            return Err(SubjectError::WildcardNotAllowed);
        }
        match *token {
            "*" => {}
            ">" if i == last => {}
            other => return Err(SubjectError::MalformedWildcard(other.to_string())),
        }
    }
    Ok(())
}

/// Whether the concrete `subject` is matched by `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
