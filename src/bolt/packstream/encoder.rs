//! PackStream encoder.

use bytes::{BufMut, BytesMut};

use super::*;

/// Encode a value into `buf`.
pub fn encode(value: &PackStreamValue, buf: &mut BytesMut) -> Result<(), PackStreamError> {
    match value {
        PackStreamValue::Null => buf.put_u8(NULL),
        PackStreamValue::Boolean(true) => buf.put_u8(TRUE),
        PackStreamValue::Boolean(false) => buf.put_u8(FALSE),
        PackStreamValue::Integer(i) => encode_int(*i, buf),
        PackStreamValue::Float(f) => {
            buf.put_u8(FLOAT_64);
            buf.put_f64(*f);
        }
        PackStreamValue::Bytes(bytes) => {
            write_size(bytes.len(), None, [BYTES_8, BYTES_16, BYTES_32], buf)?;
            buf.put_slice(bytes);
        }
        PackStreamValue::String(s) => encode_str(s, buf)?,
        PackStreamValue::List(items) => {
            write_size(items.len(), Some(TINY_LIST), [LIST_8, LIST_16, LIST_32], buf)?;
            for item in items {
                encode(item, buf)?;
            }
        }
        PackStreamValue::Map(map) => {
            write_size(map.len(), Some(TINY_MAP), [MAP_8, MAP_16, MAP_32], buf)?;
            for (key, item) in map {
                encode_str(key, buf)?;
                encode(item, buf)?;
            }
        }
        PackStreamValue::Structure(s) => {
            if s.fields.len() > 15 {
                return Err(PackStreamError::StructureTooLarge(s.fields.len()));
            }
            buf.put_u8(TINY_STRUCT | s.fields.len() as u8);
            buf.put_u8(s.tag);
            for field in &s.fields {
                encode(field, buf)?;
            }
        }
    }
    Ok(())
}

fn encode_int(i: i64, buf: &mut BytesMut) {
    if (-16..=127).contains(&i) {
        buf.put_i8(i as i8);
    } else if (i8::MIN as i64..=i8::MAX as i64).contains(&i) {
        buf.put_u8(INT_8);
        buf.put_i8(i as i8);
    } else if (i16::MIN as i64..=i16::MAX as i64).contains(&i) {
        buf.put_u8(INT_16);
        buf.put_i16(i as i16);
    } else if (i32::MIN as i64..=i32::MAX as i64).contains(&i) {
        buf.put_u8(INT_32);
        buf.put_i32(i as i32);
    } else {
        buf.put_u8(INT_64);
        buf.put_i64(i);
    }
}

fn encode_str(s: &str, buf: &mut BytesMut) -> Result<(), PackStreamError> {
    write_size(s.len(), Some(TINY_STRING), [STRING_8, STRING_16, STRING_32], buf)?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Write a size header: tiny form when available and `len < 16`, otherwise
/// the smallest of the 8/16/32-bit markers.
fn write_size(
    len: usize,
    tiny: Option<u8>,
    [m8, m16, m32]: [u8; 3],
    buf: &mut BytesMut,
) -> Result<(), PackStreamError> {
    match (tiny, len) {
        (Some(marker), n) if n < 16 => buf.put_u8(marker | n as u8),
        (_, n) if n <= u8::MAX as usize => {
            buf.put_u8(m8);
            buf.put_u8(n as u8);
        }
        (_, n) if n <= u16::MAX as usize => {
            buf.put_u8(m16);
            buf.put_u16(n as u16);
        }
        (_, n) if n <= u32::MAX as usize => {
            buf.put_u8(m32);
            buf.put_u32(n as u32);
        }
        (_, n) => return Err(PackStreamError::ValueTooLarge(n)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(value: PackStreamValue) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode(&value, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(bytes_of(1.into()), vec![0x01]);
        assert_eq!(bytes_of((-16).into()), vec![0xF0]);
        assert_eq!(bytes_of((-17).into()), vec![INT_8, 0xEF]);
        assert_eq!(bytes_of(1000.into()), vec![INT_16, 0x03, 0xE8]);
        assert_eq!(bytes_of(70_000.into()), vec![INT_32, 0x00, 0x01, 0x11, 0x70]);
        assert_eq!(bytes_of(PackStreamValue::Integer(i64::MAX))[0], INT_64);
    }

    #[test]
    fn test_string_headers() {
        assert_eq!(bytes_of("abc".into()), vec![0x83, b'a', b'b', b'c']);
        let long = "x".repeat(20);
        let encoded = bytes_of(long.as_str().into());
        assert_eq!(&encoded[..2], &[STRING_8, 20]);
    }

    #[test]
    fn test_structure_header() {
        let s = PackStreamValue::Structure(PackStreamStructure::new(0x0F, vec![]));
        assert_eq!(bytes_of(s), vec![0xB0, 0x0F]);

        let too_big = PackStreamValue::Structure(PackStreamStructure::new(
            0x01,
            vec![PackStreamValue::Null; 16],
        ));
        let mut buf = BytesMut::new();
        assert_eq!(
            encode(&too_big, &mut buf),
            Err(PackStreamError::StructureTooLarge(16))
        );
    }
}
