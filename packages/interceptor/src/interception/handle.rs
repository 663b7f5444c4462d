// packages/interceptor/src/interception/handle.rs
//! Opaque handles returned by registration
//!
//! A handle renders as `<kind>_<ULID>` so callers can store it as a plain
//! string and hand it back later for removal.

use crate::utils::errors::InterceptError;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Which table a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Preprocessor,
    Interceptor,
    Mapping,
}

impl HandlerKind {
    fn prefix(self) -> &'static str {
        match self {
            HandlerKind::Preprocessor => "pre",
            HandlerKind::Interceptor => "int",
            HandlerKind::Mapping => "map",
        }
    }
}

/// Opaque removal key for a registered preprocessor, interceptor or mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    kind: HandlerKind,
    id: Ulid,
}

impl HandlerKey {
    /// Generate a fresh key; ULIDs carry 80 random bits so keys are never reused
    pub fn generate(kind: HandlerKind) -> Self {
        Self {
            kind,
            id: Ulid::new(),
        }
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.prefix(), self.id)
    }
}

impl FromStr for HandlerKey {
    type Err = InterceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InterceptError::ConfigError(format!("invalid handler key: {}", s));

        let (prefix, id) = s.split_once('_').ok_or_else(invalid)?;
        let kind = match prefix {
            "pre" => HandlerKind::Preprocessor,
            "int" => HandlerKind::Interceptor,
            "map" => HandlerKind::Mapping,
            _ => return Err(invalid()),
        };
        let id = Ulid::from_string(id).map_err(|_| invalid())?;

        Ok(Self { kind, id })
    }
}
