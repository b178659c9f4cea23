// The view of a compact collection that the rest of the engine gets: which
// encoding is active and how big it is, without reaching into the layout.

use crate::{compactmap::CompactMap, config::Limits, intset::IntSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    IntSet,
    CompactMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    Set(IntSet),
    Map(CompactMap),
}

impl Collection {
    pub fn encoding(&self) -> Encoding {
        match self {
            Collection::Set(_) => Encoding::IntSet,
            Collection::Map(_) => Encoding::CompactMap,
        }
    }

    pub fn len(&self) -> u32 {
        match self {
            Collection::Set(s) => s.len(),
            Collection::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        match self {
            Collection::Set(s) => s.byte_size(),
            Collection::Map(m) => m.byte_size(),
        }
    }

    /// The raw buffer, in the layout of the active encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Collection::Set(s) => s.as_bytes(),
            Collection::Map(m) => m.as_bytes(),
        }
    }

    /// How many allocations releasing this collection would free. Both
    /// encodings live in a single buffer, so freeing them is never worth
    /// deferring.
    pub fn free_effort(&self) -> usize {
        1
    }

    /// Whether the collection has grown past the point where it should be
    /// converted to a general-purpose structure.
    pub fn exceeds(&self, limits: &Limits) -> bool {
        match self {
            Collection::Set(s) => s.len() > limits.intset_max_entries,
            Collection::Map(m) => m.len() > limits.compact_map_max_entries,
        }
    }
}

impl From<IntSet> for Collection {
    fn from(s: IntSet) -> Self {
        Collection::Set(s)
    }
}

impl From<CompactMap> for Collection {
    fn from(m: CompactMap) -> Self {
        Collection::Map(m)
    }
}

/// Parses a set member as an integer if it is written exactly the way the
/// integer would be printed, so that storing it in an IntSet loses nothing.
/// "12" parses; "012", "+12", "-0" and " 12" don't.
pub fn parse_int_member(member: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(member).ok()?;
    let v: i64 = s.parse().ok()?;
    if v.to_string() == s {
        Some(v)
    } else {
        None
    }
}
