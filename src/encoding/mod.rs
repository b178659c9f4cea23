// Byte-level primitives shared by the compact encodings.
//
// Every multi-byte integer stored in a compact buffer is little-endian,
// regardless of the host. Nothing else in the crate should call
// `to_le_bytes`/`from_le_bytes` directly.

/// Prefix byte announcing a 4-byte length. Also reused by the compact map
/// header to mean "count not tracked".
pub const BIGLEN: u8 = 254;

/// Terminates a compact map buffer.
pub const END: u8 = 255;

pub fn read_u32_le(buf: &[u8]) -> u32 {
    let mut b = [0_u8; 4];
    b.copy_from_slice(&buf[..4]);
    u32::from_le_bytes(b)
}

pub fn write_u32_le(buf: &mut [u8], v: u32) {
    buf[..4].copy_from_slice(&v.to_le_bytes());
}

/// Reads a signed integer stored in `width` bytes (2, 4 or 8).
pub fn read_int(buf: &[u8], width: usize) -> i64 {
    match width {
        2 => i16::from_le_bytes([buf[0], buf[1]]) as i64,
        4 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as i64,
        8 => {
            let mut b = [0_u8; 8];
            b.copy_from_slice(&buf[..8]);
            i64::from_le_bytes(b)
        }
        _ => unreachable!("invalid integer width {}", width),
    }
}

/// Writes `v` in `width` bytes. The caller guarantees `v` fits.
pub fn write_int(buf: &mut [u8], width: usize, v: i64) {
    match width {
        2 => buf[..2].copy_from_slice(&(v as i16).to_le_bytes()),
        4 => buf[..4].copy_from_slice(&(v as i32).to_le_bytes()),
        8 => buf[..8].copy_from_slice(&v.to_le_bytes()),
        _ => unreachable!("invalid integer width {}", width),
    }
}

/// A self-describing length as it appears in a compact map buffer.
///
/// The first byte decides the shape: below `BIGLEN` it is the length itself,
/// `BIGLEN` announces a little-endian u32, and `END` is not a length at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenField {
    Short(u8),
    Long(u32),
    End,
}

impl LenField {
    pub fn for_len(len: usize) -> LenField {
        if len < BIGLEN as usize {
            LenField::Short(len as u8)
        } else {
            match u32::try_from(len) {
                Ok(l) => LenField::Long(l),
                Err(_) => panic!("length {} does not fit a length field", len),
            }
        }
    }

    /// Decodes the field at the head of `buf`. The caller guarantees that
    /// the four trailing bytes of a `Long` field are present.
    pub fn decode(buf: &[u8]) -> LenField {
        match buf[0] {
            END => LenField::End,
            BIGLEN => LenField::Long(read_u32_le(&buf[1..])),
            l => LenField::Short(l),
        }
    }

    /// Like `decode`, but returns None instead of reading past `buf`.
    pub fn try_decode(buf: &[u8]) -> Option<LenField> {
        match buf.first()? {
            &BIGLEN if buf.len() < 5 => None,
            _ => Some(Self::decode(buf)),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            LenField::Short(l) => Some(*l as usize),
            LenField::Long(l) => Some(*l as usize),
            LenField::End => None,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            LenField::Long(_) => 5,
            LenField::Short(_) | LenField::End => 1,
        }
    }

    pub fn write(&self, buf: &mut [u8]) -> usize {
        match self {
            LenField::Short(l) => {
                buf[0] = *l;
            }
            LenField::Long(l) => {
                buf[0] = BIGLEN;
                write_u32_le(&mut buf[1..], *l);
            }
            LenField::End => {
                buf[0] = END;
            }
        }
        self.encoded_len()
    }
}

#[test]
fn test_len_field() {
    for (len, expected) in [
        (0, vec![0x00]),
        (3, vec![0x03]),
        (253, vec![0xfd]),
        (254, vec![0xfe, 0xfe, 0x00, 0x00, 0x00]),
        (255, vec![0xfe, 0xff, 0x00, 0x00, 0x00]),
        (70000, vec![0xfe, 0x70, 0x11, 0x01, 0x00]),
    ] {
        let field = LenField::for_len(len);
        let mut out = [0_u8; 5];
        let n = field.write(&mut out);
        assert_eq!(&out[..n], expected.as_slice());
        assert_eq!(LenField::decode(&out), field);
        assert_eq!(field.len(), Some(len));
    }
    assert_eq!(LenField::decode(&[END]), LenField::End);
    assert_eq!(LenField::try_decode(&[BIGLEN, 1, 2]), None);
    assert_eq!(LenField::try_decode(&[]), None);
}

#[test]
fn test_int_widths() {
    let mut buf = [0_u8; 8];
    for (width, v) in [(2, -1_i64), (2, i16::MAX as i64), (4, i32::MIN as i64), (8, i64::MIN)] {
        write_int(&mut buf, width, v);
        assert_eq!(read_int(&buf, width), v);
    }
    write_int(&mut buf, 2, 0x0102);
    assert_eq!(&buf[..2], &[0x02, 0x01]);
}
