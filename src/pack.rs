use byteorder::{ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::io::{self, Read, Write};

use crate::bitset::{Bitset, Root, ELEM_MAX};
use crate::node::{Leaf256, Node16, Node32, Node64, SetNode};

//-------------------------------------

pub const FORMAT_VERSION: u8 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
enum VariantTag {
    Empty = 0,
    Singleton = 1,
    Node8 = 2,
    Node16 = 3,
    Node32 = 4,
    Node64 = 5,
}

//-------------------------------------

pub fn write_varint<W: Write>(w: &mut W, mut value: u64) -> io::Result<()> {
    while value > 0x7F {
        w.write_u8(((value & 0x7F) | 0x80) as u8)?;
        value >>= 7;
    }
    w.write_u8(value as u8)
}

pub fn read_varint<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut value = 0u64;
    for i in 0..10 {
        // a 64-bit varint never needs more than 10 bytes
        let byte = r.read_u8()?;
        if i == 9 && byte > 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varint overflows 64 bits",
            ));
        }
        value |= ((byte & 0x7F) as u64) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"))
}

//-------------------------------------

/// Serializes a handle: format version, variant tag, then the payload of
/// the root.  The resident/filled split is preserved exactly, so a
/// reloaded handle has the same compaction state.
pub fn pack<W: Write>(b: &Bitset, w: &mut W) -> io::Result<()> {
    w.write_u8(FORMAT_VERSION)?;
    match &b.root {
        Root::Empty => w.write_u8(VariantTag::Empty as u8),
        Root::Singleton(x) => {
            w.write_u8(VariantTag::Singleton as u8)?;
            write_varint(w, *x)
        }
        Root::N8(l) => {
            w.write_u8(VariantTag::Node8 as u8)?;
            l.pack(w)
        }
        Root::N16(t) => {
            w.write_u8(VariantTag::Node16 as u8)?;
            t.pack(w)
        }
        Root::N32(t) => {
            w.write_u8(VariantTag::Node32 as u8)?;
            t.pack(w)
        }
        Root::N64(t) => {
            w.write_u8(VariantTag::Node64 as u8)?;
            t.pack(w)
        }
    }
}

pub fn unpack<R: Read>(r: &mut R) -> io::Result<Bitset> {
    let version = r.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported format version",
        ));
    }

    let tag = VariantTag::try_from(r.read_u8()?)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad variant tag"))?;

    let root = match tag {
        VariantTag::Empty => Root::Empty,
        VariantTag::Singleton => {
            let x = read_varint(r)?;
            if x > ELEM_MAX {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "element outside the universe",
                ));
            }
            Root::Singleton(x)
        }
        VariantTag::Node8 => Root::N8(nonempty(Leaf256::unpack(r)?)?),
        VariantTag::Node16 => Root::N16(nonempty(Node16::unpack(r)?)?),
        VariantTag::Node32 => Root::N32(nonempty(Node32::unpack(r)?)?),
        VariantTag::Node64 => Root::N64(nonempty(Node64::unpack(r)?)?),
    };
    Ok(Bitset { root })
}

fn nonempty<N: SetNode>(n: N) -> io::Result<N> {
    if n.is_empty() {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "empty payload for a node variant",
        ))
    } else {
        Ok(n)
    }
}

//-------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(b: &Bitset) -> Bitset {
        let mut buf = Vec::new();
        pack(b, &mut buf).unwrap();
        unpack(&mut Cursor::new(buf)).unwrap()
    }

    fn bits(vals: &[u64]) -> Bitset {
        let mut b = Bitset::new();
        for &v in vals {
            b.insert(v);
        }
        b
    }

    #[test]
    fn varint_roundtrip() {
        for value in [0, 1, 127, 128, 16383, 16384, 1 << 32, ELEM_MAX, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            let decoded = read_varint(&mut Cursor::new(buf)).unwrap();
            assert_eq!(value, decoded);
        }
    }

    #[test]
    fn varint_rejects_overlong() {
        let bad = vec![0x81u8; 11];
        assert!(read_varint(&mut Cursor::new(bad)).is_err());
    }

    #[test]
    fn empty_and_singleton() {
        let e = roundtrip(&Bitset::new());
        assert!(e.is_empty());

        let s = roundtrip(&bits(&[123_456_789]));
        assert_eq!(s.to_vec(), vec![123_456_789]);
        assert_eq!(s.max_depth(), 0);
    }

    #[test]
    fn every_variant_roundtrips() {
        for probe in [5u64, 300, 100_000, 1 << 40] {
            let b = bits(&[1, probe]);
            let b2 = roundtrip(&b);
            assert_eq!(b2.to_vec(), b.to_vec());
            assert_eq!(b2.universe_size(), b.universe_size());
            b2.check().unwrap();
        }
    }

    #[test]
    fn dense_set_roundtrips() {
        let vals: Vec<u64> = (0..20_000).collect();
        let b = bits(&vals);
        let b2 = roundtrip(&b);
        assert_eq!(b2.count(), 20_000);
        assert!(b2.contains(42));
        assert!(!b2.contains(20_000));
        assert_eq!(b2.check().unwrap(), 20_000);
    }

    #[test]
    fn compaction_state_survives() {
        // middle cluster implicitly full, min/max parked around it
        let mut b = bits(&[256, 5 * 256]);
        for x in 3 * 256..4 * 256 {
            b.insert(x);
        }
        assert_eq!(b.resident_clusters(), 0);

        let b2 = roundtrip(&b);
        assert_eq!(b2.resident_clusters(), 0);
        assert_eq!(b2.count(), 258);
        assert!(b2.contains(3 * 256 + 42));

        let mut b3 = b2;
        b3.remove(3 * 256 + 5);
        assert_eq!(b3.resident_clusters(), 1);
        b3.check().unwrap();
    }

    #[test]
    fn large_values_roundtrip() {
        let b = bits(&[(1 << 31), (1 << 32), ELEM_MAX]);
        let b2 = roundtrip(&b);
        assert_eq!(b2.to_vec(), vec![(1 << 31), (1 << 32), ELEM_MAX]);
        assert_eq!(b2.successor(1 << 32), Some(ELEM_MAX));
    }

    #[test]
    fn rejects_bad_version_and_tag() {
        assert!(unpack(&mut Cursor::new(vec![99u8, 0])).is_err());
        assert!(unpack(&mut Cursor::new(vec![FORMAT_VERSION, 42])).is_err());
        assert!(unpack(&mut Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut buf = Vec::new();
        pack(&bits(&[1, 70_000]), &mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(unpack(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn file_roundtrip() -> anyhow::Result<()> {
        use std::fs::File;
        use std::io::{BufReader, BufWriter};

        let b = bits(&[7, 1000, 65_536, 1 << 33]);
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bits.bin");

        let mut w = BufWriter::new(File::create(&path)?);
        pack(&b, &mut w)?;
        drop(w);

        let mut r = BufReader::new(File::open(&path)?);
        let b2 = unpack(&mut r)?;
        assert_eq!(b2.to_vec(), b.to_vec());
        Ok(())
    }
}

//-------------------------------------
