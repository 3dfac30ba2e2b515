// Copyright (c) 2025 - Cowboy AI, Inc.
//! Composite Identifier Value Object and Codec
//!
//! Every topology entity is keyed by a human-readable path: the parent's id
//! followed by the entity's own discriminant values, joined with `:`.
//!
//! ```text
//! prod                          environment
//! prod:aws:111111111111         provider  (environment + provider_type + name)
//! prod:aws:111111111111:eu-1    region    (provider + name)
//! ```
//!
//! The codec is driven by an [`IdShape`] declared per entity type, so a type
//! that appends two segments (allocation, provider) is handled the same way
//! as one that appends a single `name`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Segment delimiter for composite identifiers
pub const DELIMITER: char = ':';

/// Identifier codec error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Invalid identifier segment {segment:?}: {reason}")]
    InvalidSegment { segment: String, reason: String },

    #[error("Malformed identifier {id:?}: expected {expected} segments, found {actual}")]
    MalformedId {
        id: String,
        expected: usize,
        actual: usize,
    },
}

/// Validate a single identifier segment
///
/// # Invariants
/// - Non-empty
/// - Does not contain the delimiter
pub fn validate_segment(segment: &str) -> Result<(), IdentifierError> {
    if segment.is_empty() {
        return Err(IdentifierError::InvalidSegment {
            segment: segment.to_string(),
            reason: "segment is empty".to_string(),
        });
    }

    if segment.contains(DELIMITER) {
        return Err(IdentifierError::InvalidSegment {
            segment: segment.to_string(),
            reason: format!("segment contains delimiter '{}'", DELIMITER),
        });
    }

    Ok(())
}

/// Join ordered segments into a composite identifier
///
/// Fails with `InvalidSegment` if any part is empty or contains `:`, or if no
/// parts are given at all.
pub fn compose<S: AsRef<str>>(parts: &[S]) -> Result<String, IdentifierError> {
    if parts.is_empty() {
        return Err(IdentifierError::InvalidSegment {
            segment: String::new(),
            reason: "no segments supplied".to_string(),
        });
    }

    let mut id = String::new();
    for (i, part) in parts.iter().enumerate() {
        let part = part.as_ref();
        validate_segment(part)?;
        if i > 0 {
            id.push(DELIMITER);
        }
        id.push_str(part);
    }

    Ok(id)
}

/// Split a composite identifier into exactly `expected` segments
pub fn decompose(id: &str, expected: usize) -> Result<Vec<String>, IdentifierError> {
    let parts: Vec<String> = id.split(DELIMITER).map(str::to_string).collect();

    if parts.len() != expected {
        return Err(IdentifierError::MalformedId {
            id: id.to_string(),
            expected,
            actual: parts.len(),
        });
    }

    for part in &parts {
        validate_segment(part)?;
    }

    Ok(parts)
}

/// Composite entity identifier
///
/// Construction through [`EntityId::parse`] only checks the segment syntax;
/// agreement with an entity type's shape is checked by [`IdShape::split`].
///
/// # Examples
///
/// ```rust
/// use cim_topology::domain::EntityId;
///
/// let id = EntityId::parse("app1:web:api").unwrap();
/// assert_eq!(id.segments(), vec!["app1", "web", "api"]);
/// assert!(id.is_descendant_of(&EntityId::parse("app1").unwrap()));
/// assert!(EntityId::parse("app1::api").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Parse and validate a composite identifier
    pub fn parse(id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        for segment in id.split(DELIMITER) {
            validate_segment(segment)?;
        }
        Ok(Self(id))
    }

    /// Build an identifier from ordered segments
    pub fn from_segments<S: AsRef<str>>(parts: &[S]) -> Result<Self, IdentifierError> {
        compose(parts).map(Self)
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the segments of this identifier
    pub fn segments(&self) -> Vec<&str> {
        self.0.split(DELIMITER).collect()
    }

    /// Number of segments in this identifier
    pub fn segment_count(&self) -> usize {
        self.0.split(DELIMITER).count()
    }

    /// True when `self` is strictly below `ancestor` in the id hierarchy
    pub fn is_descendant_of(&self, ancestor: &EntityId) -> bool {
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.as_str())
            && self.0[ancestor.0.len()..].starts_with(DELIMITER)
    }

    /// Replace the `old` prefix of this id with `new`
    ///
    /// Returns `None` when `self` is neither `old` nor a descendant of it.
    pub fn rebase(&self, old: &EntityId, new: &EntityId) -> Option<EntityId> {
        if self == old {
            return Some(new.clone());
        }
        if self.is_descendant_of(old) {
            return Some(Self(format!("{}{}", new.0, &self.0[old.0.len()..])));
        }
        None
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for EntityId {
    type Error = IdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Identifier shape of an entity type
///
/// `inherited` is the segment count of the parent's id (zero for roots),
/// `own` the number of discriminant segments the type appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdShape {
    pub inherited: usize,
    pub own: usize,
}

impl IdShape {
    /// Shape of a root type with the given number of own segments
    pub fn root(own: usize) -> Self {
        Self { inherited: 0, own }
    }

    /// Shape of a type appending `own` segments to a parent of shape `parent`
    pub fn child_of(parent: IdShape, own: usize) -> Self {
        Self {
            inherited: parent.total(),
            own,
        }
    }

    /// Total number of segments in an id of this shape
    pub fn total(&self) -> usize {
        self.inherited + self.own
    }

    /// True for shapes that inherit nothing
    pub fn is_root(&self) -> bool {
        self.inherited == 0
    }

    /// Compose an id of this shape from the parent id and own segments
    pub fn compose<S: AsRef<str>>(
        &self,
        parent: Option<&EntityId>,
        own: &[S],
    ) -> Result<EntityId, IdentifierError> {
        let mut parts: Vec<&str> = Vec::with_capacity(self.total());

        match parent {
            Some(parent) => {
                let inherited = parent.segments();
                if inherited.len() != self.inherited {
                    return Err(IdentifierError::MalformedId {
                        id: parent.to_string(),
                        expected: self.inherited,
                        actual: inherited.len(),
                    });
                }
                parts.extend(inherited);
            }
            None if self.inherited > 0 => {
                return Err(IdentifierError::MalformedId {
                    id: String::new(),
                    expected: self.inherited,
                    actual: 0,
                });
            }
            None => {}
        }

        if own.len() != self.own {
            return Err(IdentifierError::MalformedId {
                id: compose(own).unwrap_or_default(),
                expected: self.own,
                actual: own.len(),
            });
        }
        parts.extend(own.iter().map(AsRef::as_ref));

        EntityId::from_segments(&parts)
    }

    /// Split an id of this shape into its parent id and own segments
    pub fn split(&self, id: &EntityId) -> Result<(Option<EntityId>, Vec<String>), IdentifierError> {
        let mut parts = decompose(id.as_str(), self.total())?;
        let own = parts.split_off(self.inherited);

        let parent = if parts.is_empty() {
            None
        } else {
            Some(EntityId::from_segments(&parts)?)
        };

        Ok((parent, own))
    }
}
