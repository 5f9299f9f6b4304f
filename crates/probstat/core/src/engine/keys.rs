// Probstat
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Event keys, tracked dimensions and structure names.

use std::fmt;
use std::str::FromStr;

/// Separator between the parts of a composite key
pub const KEY_SEPARATOR: &str = ":";

/// Join attribute values into a composite key.
///
/// Order-sensitive: `composite_key(&["a", "b"])` and `composite_key(&["b", "a"])`
/// are different keys. Readers must build keys with this same function.
pub fn composite_key(parts: &[&str]) -> String {
    parts.join(KEY_SEPARATOR)
}

/// One tagged event: a producer identifier and two categorical attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub entity_id: String,
    pub attr1: String,
    pub attr2: String,
}

impl Event {
    pub fn new(entity_id: impl Into<String>, attr1: impl Into<String>, attr2: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            attr1: attr1.into(),
            attr2: attr2.into(),
        }
    }

    /// Every key the shared frequency sketch is incremented for
    pub fn frequency_keys(&self) -> [String; 6] {
        frequency_keys(&self.entity_id, &self.attr1, &self.attr2)
    }
}

pub(crate) fn frequency_keys(entity_id: &str, attr1: &str, attr2: &str) -> [String; 6] {
    [
        entity_id.to_string(),
        attr1.to_string(),
        attr2.to_string(),
        composite_key(&[entity_id, attr1]),
        composite_key(&[entity_id, attr1, attr2]),
        composite_key(&[attr1, attr2]),
    ]
}

/// A dimension with its own heavy-hitter tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Entity,
    Attr1,
    Attr2,
    Attr1Attr2,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [Dimension::Entity, Dimension::Attr1, Dimension::Attr2, Dimension::Attr1Attr2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Entity => "entity",
            Dimension::Attr1 => "attr1",
            Dimension::Attr2 => "attr2",
            Dimension::Attr1Attr2 => "attr1:attr2",
        }
    }

    /// The value this dimension tracks for one event
    pub fn key_for(&self, entity_id: &str, attr1: &str, attr2: &str) -> String {
        match self {
            Dimension::Entity => entity_id.to_string(),
            Dimension::Attr1 => attr1.to_string(),
            Dimension::Attr2 => attr2.to_string(),
            Dimension::Attr1Attr2 => composite_key(&[attr1, attr2]),
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Dimension::Entity => 0,
            Dimension::Attr1 => 1,
            Dimension::Attr2 => 2,
            Dimension::Attr1Attr2 => 3,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDimension(pub String);

impl fmt::Display for UnknownDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dimension '{}', expected one of: entity, attr1, attr2, attr1:attr2", self.0)
    }
}

impl std::error::Error for UnknownDimension {}

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" | "pid" => Ok(Dimension::Entity),
            "attr1" | "utmm" => Ok(Dimension::Attr1),
            "attr2" | "utms" => Ok(Dimension::Attr2),
            "attr1:attr2" | "utmm:utms" => Ok(Dimension::Attr1Attr2),
            other => Err(UnknownDimension(other.to_string())),
        }
    }
}

/// A structure owned by the engine. Its name doubles as the store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structure {
    Cardinality,
    Frequency,
    TopK(Dimension),
}

impl Structure {
    pub const ALL: [Structure; 6] = [
        Structure::Cardinality,
        Structure::Frequency,
        Structure::TopK(Dimension::Entity),
        Structure::TopK(Dimension::Attr1),
        Structure::TopK(Dimension::Attr2),
        Structure::TopK(Dimension::Attr1Attr2),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Structure::Cardinality => "hll:entities",
            Structure::Frequency => "cms:any-key",
            Structure::TopK(Dimension::Entity) => "topk:entity",
            Structure::TopK(Dimension::Attr1) => "topk:attr1",
            Structure::TopK(Dimension::Attr2) => "topk:attr2",
            Structure::TopK(Dimension::Attr1Attr2) => "topk:attr1:attr2",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key() {
        assert_eq!(composite_key(&["profile1"]), "profile1");
        assert_eq!(composite_key(&["profile1", "social"]), "profile1:social");
        assert_eq!(composite_key(&["profile1", "social", "fun_new"]), "profile1:social:fun_new");
        assert_ne!(composite_key(&["a", "b"]), composite_key(&["b", "a"]));
        assert_eq!(composite_key(&["", ""]), ":");
    }

    #[test]
    fn test_event_frequency_keys() {
        let event = Event::new("p", "m", "s");
        assert_eq!(event.frequency_keys(), ["p", "m", "s", "p:m", "p:m:s", "m:s"].map(String::from));
    }

    #[test]
    fn test_dimension_parsing() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.as_str().parse::<Dimension>().unwrap(), dimension);
        }
        assert_eq!("utmm".parse::<Dimension>().unwrap(), Dimension::Attr1);
        assert!("color".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_dimension_keys() {
        assert_eq!(Dimension::Entity.key_for("p", "m", "s"), "p");
        assert_eq!(Dimension::Attr1Attr2.key_for("p", "m", "s"), "m:s");
    }

    #[test]
    fn test_structure_names_are_unique() {
        let mut names: Vec<&str> = Structure::ALL.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Structure::ALL.len());
        for structure in Structure::ALL {
            assert_eq!(Structure::from_name(structure.name()), Some(structure));
        }
        assert_eq!(Structure::from_name("topk:unknown"), None);
    }
}
