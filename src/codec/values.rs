//! Typed register decode/encode: a swap-semantics table over bool/uint/int/float at
//! register lengths 1/2/4.
//!
//! The 32-bit swap table is not applied at 64-bit: 64-bit values always decode/encode
//! as straight big-endian.

use crate::codec::byte_order::ByteOrder;
use crate::error::{GatewayError, Result};
use crate::model::{DataType, GatewayValue};

/// Permute 4 big-endian value bytes `[t0,t1,t2,t3]` per the endian variant.
fn permute_32(t: [u8; 4], order: ByteOrder) -> [u8; 4] {
    match order {
        ByteOrder::BigEndian | ByteOrder::BigEndian16 => [t[0], t[1], t[2], t[3]],
        ByteOrder::LittleEndian | ByteOrder::LittleEndian16 => [t[3], t[2], t[1], t[0]],
        ByteOrder::LittleEndianSwap => [t[1], t[0], t[3], t[2]], // BADC
        ByteOrder::BigEndianSwap => [t[2], t[3], t[0], t[1]],    // CDAB
    }
}

/// Inverse of `permute_32`: given the on-wire bytes, recover `[t0,t1,t2,t3]`.
fn unpermute_32(w: [u8; 4], order: ByteOrder) -> [u8; 4] {
    match order {
        ByteOrder::BigEndian | ByteOrder::BigEndian16 => [w[0], w[1], w[2], w[3]],
        ByteOrder::LittleEndian | ByteOrder::LittleEndian16 => [w[3], w[2], w[1], w[0]],
        ByteOrder::LittleEndianSwap => [w[1], w[0], w[3], w[2]],
        ByteOrder::BigEndianSwap => [w[2], w[3], w[0], w[1]],
    }
}

/// Decode one value out of a contiguous big-endian register byte view, per
/// `(type, length, endian)` at the given register offset.
pub fn decode(
    bytes: &[u8],
    offset_registers: usize,
    data_type: DataType,
    length_registers: u8,
    endian: ByteOrder,
) -> Result<GatewayValue> {
    let byte_offset = offset_registers * 2;
    match (data_type, length_registers) {
        (DataType::Bool, _) => {
            let reg = read_u16(bytes, byte_offset)?;
            Ok(GatewayValue::Bool(reg != 0))
        },
        (DataType::Uint, 1) => Ok(GatewayValue::UInt(read_u16(bytes, byte_offset)? as u64)),
        (DataType::Int, 1) => Ok(GatewayValue::Int(read_u16(bytes, byte_offset)? as i16 as i64)),
        (DataType::Uint, 2) => {
            let t = read_be4(bytes, byte_offset)?;
            let w = permute_32(t, endian);
            Ok(GatewayValue::UInt(u32::from_be_bytes(w) as u64))
        },
        (DataType::Int, 2) => {
            let t = read_be4(bytes, byte_offset)?;
            let w = permute_32(t, endian);
            Ok(GatewayValue::Int(i32::from_be_bytes(w) as i64))
        },
        (DataType::Uint, 4) => Ok(GatewayValue::UInt(u64::from_be_bytes(read_be8(bytes, byte_offset)?))),
        (DataType::Int, 4) => Ok(GatewayValue::Int(i64::from_be_bytes(read_be8(bytes, byte_offset)?))),
        (DataType::Float, 2) => {
            let t = read_be4(bytes, byte_offset)?;
            let w = permute_32(t, endian);
            Ok(GatewayValue::Float(f32::from_be_bytes(w) as f64))
        },
        (DataType::Float, 4) => Ok(GatewayValue::Float(f64::from_be_bytes(read_be8(bytes, byte_offset)?))),
        (dt, len) => Err(GatewayError::UnsupportedValue(format!("{dt:?} at length {len}"))),
    }
}

/// Encode a value into registers for a write, per the inverse of `decode`'s table.
pub fn encode(
    value: &GatewayValue,
    data_type: DataType,
    length_registers: u8,
    endian: ByteOrder,
) -> Result<Vec<u16>> {
    match (data_type, length_registers) {
        (DataType::Bool, _) => Ok(vec![if coerce_bool(value)? { 1 } else { 0 }]),
        (DataType::Uint, 1) => Ok(vec![coerce_u64(value)? as u16]),
        (DataType::Int, 1) => Ok(vec![coerce_i64(value)? as i16 as u16]),
        (DataType::Uint, 2) => {
            let t = (coerce_u64(value)? as u32).to_be_bytes();
            Ok(be4_to_registers(unpermute_32(t, endian)))
        },
        (DataType::Int, 2) => {
            let t = (coerce_i64(value)? as i32).to_be_bytes();
            Ok(be4_to_registers(unpermute_32(t, endian)))
        },
        (DataType::Uint, 4) => Ok(be8_to_registers(coerce_u64(value)?.to_be_bytes())),
        (DataType::Int, 4) => Ok(be8_to_registers(coerce_i64(value)?.to_be_bytes())),
        (DataType::Float, 2) => {
            let t = (coerce_f64(value)? as f32).to_be_bytes();
            Ok(be4_to_registers(unpermute_32(t, endian)))
        },
        (DataType::Float, 4) => Ok(be8_to_registers(coerce_f64(value)?.to_be_bytes())),
        (dt, len) => Err(GatewayError::UnsupportedValue(format!("{dt:?} at length {len}"))),
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|s| u16::from_be_bytes([s[0], s[1]]))
        .ok_or_else(|| GatewayError::Protocol("register offset out of bounds".into()))
}

fn read_be4(bytes: &[u8], offset: usize) -> Result<[u8; 4]> {
    bytes
        .get(offset..offset + 4)
        .map(|s| [s[0], s[1], s[2], s[3]])
        .ok_or_else(|| GatewayError::Protocol("register offset out of bounds".into()))
}

fn read_be8(bytes: &[u8], offset: usize) -> Result<[u8; 8]> {
    bytes
        .get(offset..offset + 8)
        .map(|s| s.try_into().unwrap())
        .ok_or_else(|| GatewayError::Protocol("register offset out of bounds".into()))
}

fn be4_to_registers(b: [u8; 4]) -> Vec<u16> {
    vec![u16::from_be_bytes([b[0], b[1]]), u16::from_be_bytes([b[2], b[3]])]
}

fn be8_to_registers(b: [u8; 8]) -> Vec<u16> {
    vec![
        u16::from_be_bytes([b[0], b[1]]),
        u16::from_be_bytes([b[2], b[3]]),
        u16::from_be_bytes([b[4], b[5]]),
        u16::from_be_bytes([b[6], b[7]]),
    ]
}

/// Value-to-bytes coercion rules: bool accepts bool/numeric/string-literal.
fn coerce_bool(value: &GatewayValue) -> Result<bool> {
    match value {
        GatewayValue::Bool(b) => Ok(*b),
        GatewayValue::Int(i) => Ok(*i != 0),
        GatewayValue::UInt(u) => Ok(*u != 0),
        GatewayValue::Float(f) => Ok(*f != 0.0),
        GatewayValue::Null => Err(GatewayError::UnsupportedValue("null for bool".into())),
    }
}

fn coerce_u64(value: &GatewayValue) -> Result<u64> {
    match value {
        GatewayValue::UInt(u) => Ok(*u),
        GatewayValue::Int(i) => Ok(*i as u64),
        GatewayValue::Float(f) => Ok(f.round() as u64),
        GatewayValue::Bool(b) => Ok(*b as u64),
        GatewayValue::Null => Err(GatewayError::UnsupportedValue("null for uint".into())),
    }
}

fn coerce_i64(value: &GatewayValue) -> Result<i64> {
    match value {
        GatewayValue::Int(i) => Ok(*i),
        GatewayValue::UInt(u) => Ok(*u as i64),
        GatewayValue::Float(f) => Ok(f.round() as i64),
        GatewayValue::Bool(b) => Ok(*b as i64),
        GatewayValue::Null => Err(GatewayError::UnsupportedValue("null for int".into())),
    }
}

fn coerce_f64(value: &GatewayValue) -> Result<f64> {
    match value {
        GatewayValue::Float(f) => Ok(*f),
        GatewayValue::Int(i) => Ok(*i as f64),
        GatewayValue::UInt(u) => Ok(*u as f64),
        GatewayValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        GatewayValue::Null => Err(GatewayError::UnsupportedValue("null for float".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float32_cdab_swap() {
        // registers [0x4048, 0xF5C3], CDAB selects [t2,t3,t0,t1] = F5 C3 40 48,
        // reinterpreted as big-endian f32.
        let bytes = [0x40, 0x48, 0xF5, 0xC3];
        let value = decode(&bytes, 0, DataType::Float, 2, ByteOrder::BigEndianSwap).unwrap();
        let expected = f32::from_be_bytes([0xF5, 0xC3, 0x40, 0x48]) as f64;
        assert_eq!(value, GatewayValue::Float(expected));
    }

    #[test]
    fn uint32_all_four_endian_variants() {
        let bytes = [0x12, 0x34, 0x56, 0x78];
        let abcd = decode(&bytes, 0, DataType::Uint, 2, ByteOrder::BigEndian).unwrap();
        assert_eq!(abcd, GatewayValue::UInt(0x12345678));

        let dcba = decode(&bytes, 0, DataType::Uint, 2, ByteOrder::LittleEndian).unwrap();
        assert_eq!(dcba, GatewayValue::UInt(0x78563412));

        let badc = decode(&bytes, 0, DataType::Uint, 2, ByteOrder::LittleEndianSwap).unwrap();
        assert_eq!(badc, GatewayValue::UInt(0x34127856));

        let cdab = decode(&bytes, 0, DataType::Uint, 2, ByteOrder::BigEndianSwap).unwrap();
        assert_eq!(cdab, GatewayValue::UInt(0x56781234));
    }

    #[test]
    fn encode_decode_round_trip_all_variants() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian, ByteOrder::LittleEndianSwap, ByteOrder::BigEndianSwap] {
            let value = GatewayValue::Int(-123456);
            let regs = encode(&value, DataType::Int, 2, order).unwrap();
            let mut bytes = Vec::new();
            for r in &regs {
                bytes.extend_from_slice(&r.to_be_bytes());
            }
            let decoded = decode(&bytes, 0, DataType::Int, 2, order).unwrap();
            assert_eq!(decoded, value, "round trip failed for {order:?}");
        }
    }

    #[test]
    fn sixty_four_bit_ignores_endian_variant() {
        // swap is never applied at 64-bit, regardless of `order`.
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        for order in [ByteOrder::BigEndian, ByteOrder::BigEndianSwap, ByteOrder::LittleEndianSwap] {
            let value = decode(&bytes, 0, DataType::Uint, 4, order).unwrap();
            assert_eq!(value, GatewayValue::UInt(0x0102030405060708));
        }
    }

    #[test]
    fn bool_is_nonzero_register() {
        let bytes = [0x00, 0x00];
        assert_eq!(decode(&bytes, 0, DataType::Bool, 1, ByteOrder::BigEndian).unwrap(), GatewayValue::Bool(false));
        let bytes = [0x00, 0x01];
        assert_eq!(decode(&bytes, 0, DataType::Bool, 1, ByteOrder::BigEndian).unwrap(), GatewayValue::Bool(true));
    }

    #[test]
    fn out_of_bounds_offset_is_protocol_error() {
        let bytes = [0x00, 0x01];
        assert!(decode(&bytes, 3, DataType::Uint, 1, ByteOrder::BigEndian).is_err());
    }
}
