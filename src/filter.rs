//! Inclusion policy for background declarations

use crate::meta::{is_truthy, DeclarationMeta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which declarations take part in sprite generation by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IncludeMode {
    /// Everything is sprited unless marked `"include": false`
    #[default]
    Implicit,
    /// Only declarations marked with a truthy `"include"` are sprited
    Explicit,
}

impl IncludeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncludeMode::Implicit => "implicit",
            IncludeMode::Explicit => "explicit",
        }
    }
}

impl fmt::Display for IncludeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An include mode string that is neither `implicit` nor `explicit`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown include mode '{0}' (expected 'implicit' or 'explicit')")]
pub struct UnknownIncludeMode(pub String);

impl FromStr for IncludeMode {
    type Err = UnknownIncludeMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implicit" => Ok(IncludeMode::Implicit),
            "explicit" => Ok(IncludeMode::Explicit),
            other => Err(UnknownIncludeMode(other.to_string())),
        }
    }
}

/// Decide whether a declaration with `meta` is sprited under `mode`.
pub fn should_include(meta: &DeclarationMeta, mode: IncludeMode) -> bool {
    let include = meta.include();
    match mode {
        IncludeMode::Implicit => include.map_or(true, is_truthy),
        IncludeMode::Explicit => include.is_some_and(is_truthy),
    }
}
