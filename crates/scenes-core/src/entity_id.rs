//! Entity references of the form `domain.object_id`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for malformed entity references
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("domain must be lowercase alphanumeric with single underscores, not at either end")]
    InvalidDomainChars,

    #[error("object_id must be lowercase alphanumeric with underscores, not at either end")]
    InvalidObjectIdChars,
}

/// A validated entity reference such as `light.living_room` or `scene.movie_night`
///
/// Scene members and activation targets are stored as plain strings because
/// they come straight from user configuration; `EntityId` is used wherever
/// the platform itself produces the reference (state store, event payloads).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Build an entity id from its two halves
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if !is_valid_domain(&domain) {
            return Err(EntityIdError::InvalidDomainChars);
        }
        if !is_valid_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectIdChars);
        }

        Ok(Self { domain, object_id })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// True if this entity belongs to `domain`
    pub fn is_domain(&self, domain: &str) -> bool {
        self.domain == domain
    }
}

/// Domain part of a raw entity reference
///
/// Everything before the first `.`; a reference without a separator is its
/// own domain. Unlike [`EntityId`] this never fails, which is what the scene
/// configuration path needs when it prunes attributes of unvalidated input.
pub fn domain_of(entity_ref: &str) -> &str {
    entity_ref
        .split_once('.')
        .map(|(domain, _)| domain)
        .unwrap_or(entity_ref)
}

/// Lowercase alphanumerics and underscores, no leading or trailing underscore
fn is_valid_slug(s: &str) -> bool {
    if s.starts_with('_') || s.ends_with('_') {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Same as a slug, and a domain may not contain `__`
fn is_valid_domain(s: &str) -> bool {
    !s.contains("__") && is_valid_slug(s)
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
