// An IntSet is a sorted array of distinct integers, all stored at the same
// width, living in a single buffer:
//
//   [encoding: u32][length: u32][member 0]...[member length-1]
//
// The width is the smallest of 2, 4 or 8 bytes that could hold every member
// at the time it was chosen. Inserting a member that needs a wider encoding
// re-encodes the whole array; removing members never narrows it again.
//
// Every mutating operation consumes the set and hands back the (possibly
// reallocated) set, so a stale handle can't be used after the buffer moved.

use std::fmt;

use anyhow::{bail, ensure};
use rand::Rng;

use crate::encoding::{read_int, read_u32_le, write_int, write_u32_le};

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Width {
    W16,
    W32,
    W64,
}

impl Width {
    /// The narrowest width able to represent `v`.
    pub fn for_value(v: i64) -> Width {
        if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
            Width::W16
        } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            Width::W32
        } else {
            Width::W64
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    fn from_bytes(n: u32) -> Option<Width> {
        match n {
            2 => Some(Width::W16),
            4 => Some(Width::W32),
            8 => Some(Width::W64),
            _ => None,
        }
    }
}

fn overflow(len: usize, width: Width) -> ! {
    panic!(
        "intset of {} members at width {:?} exceeds addressable size",
        len, width
    )
}

#[derive(Clone, PartialEq, Eq)]
pub struct IntSet {
    buf: Vec<u8>,
}

impl IntSet {
    pub fn new() -> Self {
        let mut buf = vec![0_u8; HEADER_LEN];
        write_u32_le(&mut buf[0..4], Width::W16.bytes() as u32);
        IntSet { buf }
    }

    /// Adopts a buffer produced elsewhere (e.g. loaded from disk), checking
    /// that it is a well-formed set first.
    pub fn from_bytes(buf: Vec<u8>) -> anyhow::Result<Self> {
        ensure!(
            buf.len() >= HEADER_LEN,
            "intset buffer of {} bytes is shorter than its header",
            buf.len()
        );
        let encoding = read_u32_le(&buf[0..4]);
        let width = match Width::from_bytes(encoding) {
            Some(w) => w,
            None => bail!("invalid intset encoding {}", encoding),
        };
        let len = read_u32_le(&buf[4..8]) as usize;
        let expected = len
            .checked_mul(width.bytes())
            .and_then(|n| n.checked_add(HEADER_LEN));
        ensure!(
            expected == Some(buf.len()),
            "intset of {} members at {:?} can't be {} bytes long",
            len,
            width,
            buf.len()
        );

        let set = IntSet { buf };
        let mut prev = None;
        for (i, v) in set.iter().enumerate() {
            if let Some(p) = prev {
                if p >= v {
                    tracing::warn!(index = i, "rejecting unsorted intset");
                    bail!("intset members out of order at index {}: {} >= {}", i, p, v);
                }
            }
            prev = Some(v);
        }
        Ok(set)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn width(&self) -> Width {
        match Width::from_bytes(read_u32_le(&self.buf[0..4])) {
            Some(w) => w,
            None => unreachable!("intset header holds an invalid encoding"),
        }
    }

    pub fn len(&self) -> u32 {
        read_u32_le(&self.buf[4..8])
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of the buffer, header included.
    pub fn byte_size(&self) -> usize {
        self.buf.len()
    }

    pub fn get(&self, idx: u32) -> Option<i64> {
        if idx < self.len() {
            Some(self.get_at(idx as usize, self.width()))
        } else {
            None
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        Width::for_value(value) <= self.width() && self.search(value).is_ok()
    }

    /// Picks a member uniformly at random, or None if the set is empty.
    pub fn random_member<R>(&self, rng: &mut R) -> Option<i64>
    where
        R: Rng + ?Sized,
    {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.get(rng.gen_range(0..len))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = i64> + ExactSizeIterator + '_ {
        let width = self.width();
        (0..self.len() as usize).map(move |i| self.get_at(i, width))
    }

    /// Inserts `value`, returning the set and whether it was newly added.
    pub fn add(mut self, value: i64) -> (Self, bool) {
        if Width::for_value(value) > self.width() {
            return (self.upgrade_and_add(value), true);
        }

        match self.search(value) {
            Ok(_) => (self, false),
            Err(pos) => {
                let len = self.len() as usize;
                self.resize(len + 1);
                if pos < len {
                    self.move_tail(pos, pos + 1);
                }
                self.set_at(pos, value);
                self.set_len(len + 1);
                (self, true)
            }
        }
    }

    /// Removes `value`, returning the set and whether it was present.
    pub fn remove(mut self, value: i64) -> (Self, bool) {
        if Width::for_value(value) > self.width() {
            return (self, false);
        }

        match self.search(value) {
            Ok(pos) => {
                let len = self.len() as usize;
                if pos < len - 1 {
                    self.move_tail(pos + 1, pos);
                }
                self.resize(len - 1);
                self.set_len(len - 1);
                (self, true)
            }
            Err(_) => (self, false),
        }
    }

    // Binary search over the members. Ok(pos) if found, otherwise Err(pos)
    // with the position where `value` would be inserted.
    fn search(&self, value: i64) -> Result<usize, usize> {
        let len = self.len() as usize;
        if len == 0 {
            return Err(0);
        }
        let width = self.width();

        // Values past either end are common when appending or prepending;
        // answer those without a search.
        if value > self.get_at(len - 1, width) {
            return Err(len);
        } else if value < self.get_at(0, width) {
            return Err(0);
        }

        let (mut lo, mut hi) = (0, len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let cur = self.get_at(mid, width);
            if cur == value {
                return Ok(mid);
            } else if cur < value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Err(lo)
    }

    // Widens the set to fit `value` and inserts it. A value that needs a
    // wider encoding lies outside the range of every current member, so it
    // goes either at the very front (negative) or the very back.
    fn upgrade_and_add(mut self, value: i64) -> Self {
        let old = self.width();
        let new = Width::for_value(value);
        let len = self.len() as usize;
        let prepend = usize::from(value < 0);

        tracing::debug!(from = ?old, to = ?new, members = len, "widening intset");

        self.set_width(new);
        self.resize(len + 1);

        // Walk from the last member to the first. At the wider stride each
        // destination starts at or after its source, so going backwards never
        // clobbers a member that hasn't been moved yet.
        for i in (0..len).rev() {
            let v = self.get_at(i, old);
            self.set_at(i + prepend, v);
        }

        if prepend == 1 {
            self.set_at(0, value);
        } else {
            self.set_at(len, value);
        }
        self.set_len(len + 1);
        self
    }

    // Shifts every member from `from` to the end so that it starts at `to`.
    // The buffer must already be large enough.
    fn move_tail(&mut self, from: usize, to: usize) {
        let width = self.width().bytes();
        let len = self.len() as usize;
        let n = (len - from) * width;
        let src = HEADER_LEN + from * width;
        let dst = HEADER_LEN + to * width;
        self.buf.copy_within(src..src + n, dst);
    }

    fn resize(&mut self, len: usize) {
        let width = self.width();
        if len > u32::MAX as usize {
            overflow(len, width);
        }
        let size = match len
            .checked_mul(width.bytes())
            .and_then(|n| n.checked_add(HEADER_LEN))
        {
            Some(size) => size,
            None => overflow(len, width),
        };
        let shrinking = size < self.buf.len();
        self.buf.resize(size, 0);
        if shrinking {
            self.buf.shrink_to_fit();
        }
    }

    fn get_at(&self, idx: usize, width: Width) -> i64 {
        let w = width.bytes();
        let off = HEADER_LEN + idx * w;
        read_int(&self.buf[off..off + w], w)
    }

    fn set_at(&mut self, idx: usize, v: i64) {
        let w = self.width().bytes();
        let off = HEADER_LEN + idx * w;
        write_int(&mut self.buf[off..off + w], w, v);
    }

    fn set_len(&mut self, len: usize) {
        write_u32_le(&mut self.buf[4..8], len as u32);
    }

    fn set_width(&mut self, width: Width) {
        write_u32_le(&mut self.buf[0..4], width.bytes() as u32);
    }
}

impl Default for IntSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IntSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntSet")
            .field("width", &self.width())
            .field("members", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
