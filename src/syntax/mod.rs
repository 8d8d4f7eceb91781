//! Address grammar check, the first pipeline stage.
//!
//! The accepted grammar is deliberately narrow: a dot-atom-ish local part
//! of ASCII letters, digits, `.`, `_` and `-` (never starting with a dot),
//! a single `@`, and a domain made of the same characters that ends in an
//! alphabetic top-level label of at least two letters.

mod types;

pub use types::{EmailAddress, SyntaxError};

use std::sync::LazyLock;

use regex::Regex;

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-][A-Za-z0-9._-]*)@([A-Za-z0-9._-]+\.[A-Za-z]{2,})$")
        .expect("address pattern compiles")
});

/// Parses `raw` into an [`EmailAddress`].
///
/// The input is matched as-is (no trimming, no case folding), so the
/// returned parts always reassemble into `raw`.
pub fn validate(raw: &str) -> Result<EmailAddress, SyntaxError> {
    let captures = ADDRESS.captures(raw).ok_or_else(|| SyntaxError::new(raw))?;
    match (captures.get(1), captures.get(2)) {
        (Some(local), Some(domain)) => {
            Ok(EmailAddress::from_parts(local.as_str(), domain.as_str()))
        }
        _ => Err(SyntaxError::new(raw)),
    }
}
