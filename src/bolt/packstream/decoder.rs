//! PackStream decoder.

use bytes::{Buf, Bytes};

use super::*;

/// Decode one value from the front of `buf`, advancing it.
pub fn decode(buf: &mut Bytes) -> Result<PackStreamValue, PackStreamError> {
    let marker = read_u8(buf)?;

    match marker {
        0x00..=0x7F | 0xF0..=0xFF => Ok(PackStreamValue::Integer(marker as i8 as i64)),
        0x80..=0x8F => read_string(buf, (marker & 0x0F) as usize),
        0x90..=0x9F => read_list(buf, (marker & 0x0F) as usize),
        0xA0..=0xAF => read_map(buf, (marker & 0x0F) as usize),
        0xB0..=0xBF => {
            let len = (marker & 0x0F) as usize;
            let tag = read_u8(buf)?;
            let mut fields = Vec::with_capacity(len);
            for _ in 0..len {
                fields.push(decode(buf)?);
            }
            Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
        }
        NULL => Ok(PackStreamValue::Null),
        TRUE => Ok(PackStreamValue::Boolean(true)),
        FALSE => Ok(PackStreamValue::Boolean(false)),
        FLOAT_64 => {
            ensure(buf, 8)?;
            Ok(PackStreamValue::Float(buf.get_f64()))
        }
        INT_8 => {
            ensure(buf, 1)?;
            Ok(PackStreamValue::Integer(buf.get_i8() as i64))
        }
        INT_16 => {
            ensure(buf, 2)?;
            Ok(PackStreamValue::Integer(buf.get_i16() as i64))
        }
        INT_32 => {
            ensure(buf, 4)?;
            Ok(PackStreamValue::Integer(buf.get_i32() as i64))
        }
        INT_64 => {
            ensure(buf, 8)?;
            Ok(PackStreamValue::Integer(buf.get_i64()))
        }
        BYTES_8 | BYTES_16 | BYTES_32 => {
            let len = read_size(buf, marker - BYTES_8)?;
            ensure(buf, len)?;
            Ok(PackStreamValue::Bytes(buf.split_to(len).to_vec()))
        }
        STRING_8 | STRING_16 | STRING_32 => {
            let len = read_size(buf, marker - STRING_8)?;
            read_string(buf, len)
        }
        LIST_8 | LIST_16 | LIST_32 => {
            let len = read_size(buf, marker - LIST_8)?;
            read_list(buf, len)
        }
        MAP_8 | MAP_16 | MAP_32 => {
            let len = read_size(buf, marker - MAP_8)?;
            read_map(buf, len)
        }
        other => Err(PackStreamError::UnknownMarker(other)),
    }
}

fn ensure(buf: &Bytes, n: usize) -> Result<(), PackStreamError> {
    if buf.remaining() < n {
        Err(PackStreamError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn read_u8(buf: &mut Bytes) -> Result<u8, PackStreamError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

// width: 0 => u8, 1 => u16, 2 => u32
fn read_size(buf: &mut Bytes, width: u8) -> Result<usize, PackStreamError> {
    match width {
        0 => read_u8(buf).map(usize::from),
        1 => {
            ensure(buf, 2)?;
            Ok(buf.get_u16() as usize)
        }
        _ => {
            ensure(buf, 4)?;
            Ok(buf.get_u32() as usize)
        }
    }
}

fn read_string(buf: &mut Bytes, len: usize) -> Result<PackStreamValue, PackStreamError> {
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec())
        .map(PackStreamValue::String)
        .map_err(|_| PackStreamError::InvalidUtf8)
}

fn read_list(buf: &mut Bytes, len: usize) -> Result<PackStreamValue, PackStreamError> {
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(decode(buf)?);
    }
    Ok(PackStreamValue::List(items))
}

fn read_map(buf: &mut Bytes, len: usize) -> Result<PackStreamValue, PackStreamError> {
    let mut map = BoltMap::with_capacity(len.min(1024));
    for _ in 0..len {
        let key = match decode(buf)? {
            PackStreamValue::String(s) => s,
            _ => return Err(PackStreamError::InvalidMapKey),
        };
        let value = decode(buf)?;
        map.insert(key, value);
    }
    Ok(PackStreamValue::Map(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_slice(bytes: &[u8]) -> Result<PackStreamValue, PackStreamError> {
        let mut buf = Bytes::copy_from_slice(bytes);
        decode(&mut buf)
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_slice(&[0xC0]), Ok(PackStreamValue::Null));
        assert_eq!(decode_slice(&[0xC3]), Ok(PackStreamValue::Boolean(true)));
        assert_eq!(decode_slice(&[0xFF]), Ok(PackStreamValue::Integer(-1)));
        assert_eq!(decode_slice(&[INT_16, 0x03, 0xE8]), Ok(PackStreamValue::Integer(1000)));
    }

    #[test]
    fn test_decode_success_metadata() {
        // SUCCESS {has_more: false}
        let bytes = [
            0xB1, 0x70, 0xA1, 0x88, b'h', b'a', b's', b'_', b'm', b'o', b'r', b'e', 0xC2,
        ];
        let value = decode_slice(&bytes).unwrap();
        let s = value.as_structure().unwrap();
        assert_eq!(s.tag, 0x70);
        let meta = s.fields[0].as_map().unwrap();
        assert_eq!(meta.get("has_more"), Some(&PackStreamValue::Boolean(false)));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_slice(&[]), Err(PackStreamError::UnexpectedEof));
        assert_eq!(decode_slice(&[0x83, b'a']), Err(PackStreamError::UnexpectedEof));
        assert_eq!(decode_slice(&[0xC4]), Err(PackStreamError::UnknownMarker(0xC4)));
        assert_eq!(decode_slice(&[0xA1, 0x01, 0x01]), Err(PackStreamError::InvalidMapKey));
        assert_eq!(decode_slice(&[0x81, 0xFF]), Err(PackStreamError::InvalidUtf8));
    }
}
