// A CompactMap stores string-to-string pairs back to back in one buffer:
//
//   [count][key len][key][value len][free][value][free bytes]...[END]
//
// The count byte holds the number of entries while that number is below
// BIGLEN; once it reaches BIGLEN it stops being maintained and the entries
// have to be walked to count them.
//
// Lengths are LenFields: one byte below BIGLEN, otherwise BIGLEN followed by
// a 4-byte little-endian length.
//
// `free` counts unused bytes trailing a value. They appear when a value is
// overwritten by a slightly shorter one, which lets the update happen in
// place. Slack never reaches MAX_FREE: past that point the tail is moved
// down and the buffer shrunk instead.
//
// For example, "foo" => "bar", "hello" => "world" is
//
//   "\x02\x03foo\x03\x00bar\x05hello\x05\x00world\xff"
//
// Lookups are linear scans. Entries are kept in the order they were first
// inserted.

use std::{collections::HashSet, fmt, ops::Range};

use anyhow::{bail, ensure, Context};

use crate::encoding::{LenField, BIGLEN, END};

/// Slack at which an updated entry is compacted instead of padded.
pub const MAX_FREE: usize = 4;

// Location of one entry inside the buffer.
#[derive(Debug, Clone)]
struct RawEntry {
    start: usize,
    key: Range<usize>,
    value: Range<usize>,
    free: u8,
    // One past the last free byte, i.e. the start of the next entry.
    end: usize,
}

impl RawEntry {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

// Bytes needed to store a fresh entry with no slack.
fn required_len(klen: usize, vlen: usize) -> usize {
    let total = klen
        .checked_add(vlen)
        .and_then(|n| n.checked_add(3))
        .and_then(|n| n.checked_add(LenField::for_len(klen).encoded_len() - 1))
        .and_then(|n| n.checked_add(LenField::for_len(vlen).encoded_len() - 1));
    match total {
        Some(n) => n,
        None => panic!("entry of {} + {} bytes overflows", klen, vlen),
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CompactMap {
    buf: Vec<u8>,
}

impl CompactMap {
    pub fn new() -> Self {
        CompactMap { buf: vec![0, END] }
    }

    /// Adopts a buffer produced elsewhere (e.g. loaded from disk), walking
    /// it to make sure every entry is in bounds and the keys are unique.
    pub fn from_bytes(buf: Vec<u8>) -> anyhow::Result<Self> {
        ensure!(
            buf.len() >= 2,
            "compact map buffer of {} bytes is too short",
            buf.len()
        );
        ensure!(buf[0] != END, "compact map count byte holds the end marker");
        ensure!(
            buf[buf.len() - 1] == END,
            "compact map buffer is not terminated"
        );

        // Entries may not extend into the end marker.
        let limit = buf.len() - 1;
        let mut keys = HashSet::new();
        let mut p = 1;
        loop {
            let kf = LenField::try_decode(&buf[p..])
                .with_context(|| format!("truncated key length at offset {}", p))?;
            let klen = match kf.len() {
                Some(l) => l,
                None if p == limit => break,
                None => bail!("end marker at offset {} before the end of the buffer", p),
            };
            let key_start = p + kf.encoded_len();
            let vp = key_start
                .checked_add(klen)
                .filter(|vp| *vp < limit)
                .with_context(|| format!("key at offset {} runs past the buffer", p))?;

            let vf = LenField::try_decode(&buf[vp..limit])
                .with_context(|| format!("truncated value length at offset {}", vp))?;
            let vlen = match vf.len() {
                Some(l) => l,
                None => bail!("value length at offset {} is the end marker", vp),
            };
            let free_pos = vp + vf.encoded_len();
            ensure!(free_pos < limit, "missing free byte at offset {}", free_pos);
            let free = buf[free_pos] as usize;
            let end = (free_pos + 1)
                .checked_add(vlen)
                .and_then(|n| n.checked_add(free))
                .filter(|end| *end <= limit)
                .with_context(|| format!("value at offset {} runs past the buffer", vp))?;

            if !keys.insert(&buf[key_start..key_start + klen]) {
                tracing::warn!(offset = p, "rejecting compact map with duplicate key");
                bail!("duplicate key at offset {}", p);
            }
            p = end;
        }

        if buf[0] < BIGLEN {
            ensure!(
                buf[0] as usize == keys.len(),
                "count byte says {} entries but there are {}",
                buf[0],
                keys.len()
            );
        }
        drop(keys);

        Ok(CompactMap { buf })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Sets `key` to `value`, returning the map and whether the key already
    /// existed.
    pub fn set(mut self, key: &[u8], value: &[u8]) -> (Self, bool) {
        let reqlen = required_len(key.len(), value.len());
        let zmlen = self.buf.len();

        let (offset, freelen, existed) = match self.find(key) {
            None => {
                // Append just before the end marker.
                let offset = zmlen - 1;
                self.resize(zmlen + reqlen);
                if self.buf[0] < BIGLEN {
                    self.buf[0] += 1;
                }
                (offset, reqlen, false)
            }
            Some(e) => {
                let offset = e.start;
                let mut freelen = e.len();
                if freelen < reqlen {
                    // Not enough room: open a gap of exactly reqlen bytes by
                    // moving everything after this entry up.
                    tracing::trace!(offset, from = freelen, to = reqlen, "growing entry");
                    self.resize(zmlen - freelen + reqlen);
                    self.buf
                        .copy_within(offset + freelen..zmlen - 1, offset + reqlen);
                    freelen = reqlen;
                }
                (offset, freelen, true)
            }
        };

        let empty = freelen - reqlen;
        let vempty = if empty >= MAX_FREE {
            // Too much slack to keep around; move the tail down over it.
            tracing::trace!(offset, empty, "compacting entry");
            let zmlen = self.buf.len();
            self.buf
                .copy_within(offset + freelen..zmlen - 1, offset + reqlen);
            self.resize(zmlen - empty);
            0
        } else {
            empty
        };

        self.write_entry(offset, key, value, vempty as u8);
        (self, existed)
    }

    /// Removes `key`, returning the map and whether it was present.
    pub fn delete(mut self, key: &[u8]) -> (Self, bool) {
        match self.find(key) {
            None => (self, false),
            Some(e) => {
                let zmlen = self.buf.len();
                self.buf.copy_within(e.end..zmlen - 1, e.start);
                self.resize(zmlen - e.len());
                if self.buf[0] < BIGLEN {
                    self.buf[0] -= 1;
                }
                (self, true)
            }
        }
    }

    /// Looks up `key`. The returned slice borrows the map, so it can't
    /// outlive the next mutation.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.find(key).map(|e| &self.buf[e.value])
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// The slack trailing the value stored under `key`.
    pub fn free_bytes(&self, key: &[u8]) -> Option<u8> {
        self.find(key).map(|e| e.free)
    }

    /// Number of entries. Cheap while the count byte is maintained,
    /// otherwise a full walk. Never writes; see `refresh_len`.
    pub fn len(&self) -> u32 {
        if self.buf[0] < BIGLEN {
            self.buf[0] as u32
        } else {
            self.iter().count() as u32
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf[1] == END
    }

    /// Like `len`, but if the count had to be recomputed and now fits in
    /// the count byte again, stores it there so later calls are cheap.
    pub fn refresh_len(&mut self) -> u32 {
        let len = self.len();
        if self.buf[0] == BIGLEN && len < BIGLEN as u32 {
            tracing::trace!(len, "caching compact map count");
            self.buf[0] = len as u8;
        }
        len
    }

    /// Total size of the buffer, found by walking to the end marker.
    pub fn byte_size(&self) -> usize {
        let mut p = 1;
        while let Some(e) = self.entry_at(p) {
            p = e.end;
        }
        debug_assert_eq!(p + 1, self.buf.len());
        p + 1
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter { map: self, pos: 1 }
    }

    fn find(&self, key: &[u8]) -> Option<RawEntry> {
        let mut p = 1;
        while let Some(e) = self.entry_at(p) {
            if &self.buf[e.key.clone()] == key {
                return Some(e);
            }
            p = e.end;
        }
        None
    }

    // Decodes the entry starting at `p`, or None if `p` is the end marker.
    fn entry_at(&self, p: usize) -> Option<RawEntry> {
        let kf = LenField::decode(&self.buf[p..]);
        let klen = kf.len()?;
        let key_start = p + kf.encoded_len();
        let vp = key_start + klen;

        let vf = LenField::decode(&self.buf[vp..]);
        let vlen = match vf.len() {
            Some(l) => l,
            None => unreachable!("value length at offset {} is the end marker", vp),
        };
        let free_pos = vp + vf.encoded_len();
        let free = self.buf[free_pos];
        let value_start = free_pos + 1;

        Some(RawEntry {
            start: p,
            key: key_start..vp,
            value: value_start..value_start + vlen,
            free,
            end: value_start + vlen + free as usize,
        })
    }

    fn write_entry(&mut self, offset: usize, key: &[u8], value: &[u8], free: u8) {
        let mut p = offset;
        p += LenField::for_len(key.len()).write(&mut self.buf[p..]);
        self.buf[p..p + key.len()].copy_from_slice(key);
        p += key.len();
        p += LenField::for_len(value.len()).write(&mut self.buf[p..]);
        self.buf[p] = free;
        p += 1;
        self.buf[p..p + value.len()].copy_from_slice(value);
    }

    // Resizes the buffer and rewrites the end marker in its last byte.
    fn resize(&mut self, len: usize) {
        let shrinking = len < self.buf.len();
        self.buf.resize(len, 0);
        self.buf[len - 1] = END;
        if shrinking {
            self.buf.shrink_to_fit();
        }
    }
}

impl Default for CompactMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompactMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.buf[0] < BIGLEN {
            write!(f, "{{count {}}}", self.buf[0])?;
        } else {
            write!(f, "{{count ?}}")?;
        }
        let mut p = 1;
        while let Some(e) = self.entry_at(p) {
            write!(
                f,
                "{{key {}}}{}{{value {}}}{}[free {}]",
                e.key.len(),
                self.buf[e.key.clone()].escape_ascii(),
                e.value.len(),
                self.buf[e.value.clone()].escape_ascii(),
                e.free,
            )?;
            p = e.end;
        }
        write!(f, "{{end}}")
    }
}

/// Walks the entries of a map front to back.
#[derive(Clone)]
pub struct Iter<'a> {
    map: &'a CompactMap,
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let e = self.map.entry_at(self.pos)?;
        self.pos = e.end;
        Some((&self.map.buf[e.key], &self.map.buf[e.value]))
    }
}

impl<'a> IntoIterator for &'a CompactMap {
    type Item = (&'a [u8], &'a [u8]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
