// Compact, single-buffer encodings for small collections.
//
// `IntSet` keeps a sorted array of integers at the narrowest width that fits
// them; `CompactMap` keeps length-prefixed key/value pairs back to back.
// Both trade linear (or logarithmic) access for density, and are meant to be
// swapped out for a general-purpose structure once they grow past the
// `Limits` in `config`.
//
// Each collection *is* its buffer. Mutations take the collection by value
// and return it, since the buffer may have been reallocated:
//
//     let (set, inserted) = set.add(42);

pub mod compactmap;
pub mod config;
pub mod encoding;
pub mod intset;
pub mod object;

#[cfg(test)]
mod proptests;

pub use compactmap::CompactMap;
pub use config::Limits;
pub use intset::{IntSet, Width};
pub use object::{Collection, Encoding};
