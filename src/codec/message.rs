//! Typed Modbus PDU contents and the request/response envelopes that carry them.
//!
//! `ModbusPdu` (see `pdu.rs`) is the raw byte buffer on the wire; `Pdu` is the decoded,
//! tagged-union view of it — one variant per supported function code, for both
//! directions, plus the shared exception-response variant.

use crate::error::{GatewayError, Result};

use super::pdu::{ModbusPdu, PduBuilder};

/// Function codes this crate implements.
pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Decoded Modbus PDU contents: one variant per supported function code per
/// direction, plus the shared exception-response variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    ReadCoilsReq { address: u16, count: u16 },
    ReadCoilsResp { values: Vec<bool> },
    ReadDiscreteInputsReq { address: u16, count: u16 },
    ReadDiscreteInputsResp { values: Vec<bool> },
    ReadHoldingRegistersReq { address: u16, count: u16 },
    ReadHoldingRegistersResp { registers: Vec<u16> },
    ReadInputRegistersReq { address: u16, count: u16 },
    ReadInputRegistersResp { registers: Vec<u16> },
    WriteSingleCoilReq { address: u16, value: bool },
    WriteSingleCoilResp { address: u16, value: bool },
    WriteSingleRegisterReq { address: u16, value: u16 },
    WriteSingleRegisterResp { address: u16, value: u16 },
    WriteMultipleCoilsReq { address: u16, values: Vec<bool> },
    WriteMultipleCoilsResp { address: u16, count: u16 },
    WriteMultipleRegistersReq { address: u16, values: Vec<u16> },
    WriteMultipleRegistersResp { address: u16, count: u16 },
    /// Exception response: the wire function code already has bit 0x80 set.
    Error { function_code: u8, exception_code: u8 },
}

impl Pdu {
    /// The request function code this PDU belongs to (for matching responses to
    /// the request that produced them, and for client-side dispatch).
    pub fn function_code(&self) -> u8 {
        match self {
            Pdu::ReadCoilsReq { .. } | Pdu::ReadCoilsResp { .. } => FC_READ_COILS,
            Pdu::ReadDiscreteInputsReq { .. } | Pdu::ReadDiscreteInputsResp { .. } => {
                FC_READ_DISCRETE_INPUTS
            },
            Pdu::ReadHoldingRegistersReq { .. } | Pdu::ReadHoldingRegistersResp { .. } => {
                FC_READ_HOLDING_REGISTERS
            },
            Pdu::ReadInputRegistersReq { .. } | Pdu::ReadInputRegistersResp { .. } => {
                FC_READ_INPUT_REGISTERS
            },
            Pdu::WriteSingleCoilReq { .. } | Pdu::WriteSingleCoilResp { .. } => {
                FC_WRITE_SINGLE_COIL
            },
            Pdu::WriteSingleRegisterReq { .. } | Pdu::WriteSingleRegisterResp { .. } => {
                FC_WRITE_SINGLE_REGISTER
            },
            Pdu::WriteMultipleCoilsReq { .. } | Pdu::WriteMultipleCoilsResp { .. } => {
                FC_WRITE_MULTIPLE_COILS
            },
            Pdu::WriteMultipleRegistersReq { .. } | Pdu::WriteMultipleRegistersResp { .. } => {
                FC_WRITE_MULTIPLE_REGISTERS
            },
            Pdu::Error { function_code, .. } => function_code & 0x7F,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Pdu::Error { .. })
    }

    /// Serialize into a raw `ModbusPdu` byte buffer.
    pub fn encode(&self) -> Result<ModbusPdu> {
        match self {
            Pdu::ReadCoilsReq { address, count }
            | Pdu::ReadDiscreteInputsReq { address, count }
            | Pdu::ReadHoldingRegistersReq { address, count }
            | Pdu::ReadInputRegistersReq { address, count } => Ok(PduBuilder::new()
                .function_code(self.function_code())?
                .address(*address)?
                .quantity(*count)?
                .build()),

            Pdu::ReadCoilsResp { values } | Pdu::ReadDiscreteInputsResp { values } => {
                let byte_count = values.len().div_ceil(8) as u8;
                let mut b = PduBuilder::new()
                    .function_code(self.function_code())?
                    .byte(byte_count)?;
                for chunk in pack_bits(values) {
                    b = b.byte(chunk)?;
                }
                Ok(b.build())
            },

            Pdu::ReadHoldingRegistersResp { registers } | Pdu::ReadInputRegistersResp { registers } => {
                let byte_count = (registers.len() * 2) as u8;
                let mut b = PduBuilder::new()
                    .function_code(self.function_code())?
                    .byte(byte_count)?;
                for &r in registers {
                    b = b.quantity(r)?;
                }
                Ok(b.build())
            },

            Pdu::WriteSingleCoilReq { address, value }
            | Pdu::WriteSingleCoilResp { address, value } => Ok(PduBuilder::new()
                .function_code(FC_WRITE_SINGLE_COIL)?
                .address(*address)?
                .quantity(if *value { 0xFF00 } else { 0x0000 })?
                .build()),

            Pdu::WriteSingleRegisterReq { address, value }
            | Pdu::WriteSingleRegisterResp { address, value } => Ok(PduBuilder::new()
                .function_code(FC_WRITE_SINGLE_REGISTER)?
                .address(*address)?
                .quantity(*value)?
                .build()),

            Pdu::WriteMultipleCoilsReq { address, values } => {
                let byte_count = values.len().div_ceil(8) as u8;
                let mut b = PduBuilder::new()
                    .function_code(FC_WRITE_MULTIPLE_COILS)?
                    .address(*address)?
                    .quantity(values.len() as u16)?
                    .byte(byte_count)?;
                for chunk in pack_bits(values) {
                    b = b.byte(chunk)?;
                }
                Ok(b.build())
            },
            Pdu::WriteMultipleCoilsResp { address, count } => Ok(PduBuilder::new()
                .function_code(FC_WRITE_MULTIPLE_COILS)?
                .address(*address)?
                .quantity(*count)?
                .build()),

            Pdu::WriteMultipleRegistersReq { address, values } => {
                let byte_count = (values.len() * 2) as u8;
                let mut b = PduBuilder::new()
                    .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
                    .address(*address)?
                    .quantity(values.len() as u16)?
                    .byte(byte_count)?;
                for &v in values {
                    b = b.quantity(v)?;
                }
                Ok(b.build())
            },
            Pdu::WriteMultipleRegistersResp { address, count } => Ok(PduBuilder::new()
                .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
                .address(*address)?
                .quantity(*count)?
                .build()),

            Pdu::Error { function_code, exception_code } => Ok(PduBuilder::new()
                .function_code(function_code | 0x80)?
                .byte(*exception_code)?
                .build()),
        }
    }

    /// Decode a request PDU for `function_code`.
    pub fn decode_request(raw: &ModbusPdu) -> Result<Self> {
        let data = raw.as_slice();
        let fc = *data.first().ok_or_else(|| GatewayError::ShortFrame("empty pdu".into()))?;
        match fc {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS | FC_READ_HOLDING_REGISTERS
            | FC_READ_INPUT_REGISTERS => {
                let (address, count) = read_req_fields(data)?;
                Ok(match fc {
                    FC_READ_COILS => Pdu::ReadCoilsReq { address, count },
                    FC_READ_DISCRETE_INPUTS => Pdu::ReadDiscreteInputsReq { address, count },
                    FC_READ_HOLDING_REGISTERS => Pdu::ReadHoldingRegistersReq { address, count },
                    _ => Pdu::ReadInputRegistersReq { address, count },
                })
            },
            FC_WRITE_SINGLE_COIL => {
                let (address, value) = single_write_fields(data)?;
                Ok(Pdu::WriteSingleCoilReq { address, value: value == 0xFF00 })
            },
            FC_WRITE_SINGLE_REGISTER => {
                let (address, value) = single_write_fields(data)?;
                Ok(Pdu::WriteSingleRegisterReq { address, value })
            },
            FC_WRITE_MULTIPLE_COILS => {
                let (address, count, byte_count) = multi_write_header(data)?;
                let bits = data.get(6..6 + byte_count as usize)
                    .ok_or_else(|| GatewayError::ShortFrame("multi coil write payload".into()))?;
                Ok(Pdu::WriteMultipleCoilsReq { address, values: unpack_bits(bits, count as usize) })
            },
            FC_WRITE_MULTIPLE_REGISTERS => {
                let (address, count, byte_count) = multi_write_header(data)?;
                let body = data.get(6..6 + byte_count as usize)
                    .ok_or_else(|| GatewayError::ShortFrame("multi register write payload".into()))?;
                Ok(Pdu::WriteMultipleRegistersReq {
                    address,
                    values: body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect(),
                })
            },
            other => Err(GatewayError::UnsupportedFunctionCode(other)),
        }
    }

    /// Decode a response PDU, given the request function code it answers.
    pub fn decode_response(raw: &ModbusPdu, request_fc: u8) -> Result<Self> {
        let data = raw.as_slice();
        let fc = *data.first().ok_or_else(|| GatewayError::ShortFrame("empty pdu".into()))?;
        if fc & 0x80 != 0 {
            let exc = *data.get(1).ok_or_else(|| GatewayError::ShortFrame("missing exception code".into()))?;
            return Ok(Pdu::Error { function_code: fc & 0x7F, exception_code: exc });
        }
        if fc != request_fc {
            return Err(GatewayError::Protocol(format!(
                "function code mismatch: expected {:#04x}, got {:#04x}",
                request_fc, fc
            )));
        }
        match fc {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => {
                let byte_count = *data.get(1).ok_or_else(|| GatewayError::ShortFrame("missing byte count".into()))? as usize;
                let bits = data.get(2..2 + byte_count)
                    .ok_or_else(|| GatewayError::ShortFrame("coil payload".into()))?;
                let values = unpack_bits(bits, byte_count * 8);
                Ok(if fc == FC_READ_COILS {
                    Pdu::ReadCoilsResp { values }
                } else {
                    Pdu::ReadDiscreteInputsResp { values }
                })
            },
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                let byte_count = *data.get(1).ok_or_else(|| GatewayError::ShortFrame("missing byte count".into()))? as usize;
                let body = data.get(2..2 + byte_count)
                    .ok_or_else(|| GatewayError::ShortFrame("register payload".into()))?;
                let registers = body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                Ok(if fc == FC_READ_HOLDING_REGISTERS {
                    Pdu::ReadHoldingRegistersResp { registers }
                } else {
                    Pdu::ReadInputRegistersResp { registers }
                })
            },
            FC_WRITE_SINGLE_COIL => {
                let (address, value) = single_write_fields(data)?;
                Ok(Pdu::WriteSingleCoilResp { address, value: value == 0xFF00 })
            },
            FC_WRITE_SINGLE_REGISTER => {
                let (address, value) = single_write_fields(data)?;
                Ok(Pdu::WriteSingleRegisterResp { address, value })
            },
            FC_WRITE_MULTIPLE_COILS => {
                let (address, count) = read_req_fields(data)?;
                Ok(Pdu::WriteMultipleCoilsResp { address, count })
            },
            FC_WRITE_MULTIPLE_REGISTERS => {
                let (address, count) = read_req_fields(data)?;
                Ok(Pdu::WriteMultipleRegistersResp { address, count })
            },
            other => Err(GatewayError::UnsupportedFunctionCode(other)),
        }
    }
}

fn read_req_fields(data: &[u8]) -> Result<(u16, u16)> {
    if data.len() < 5 {
        return Err(GatewayError::ShortFrame("expected address+quantity".into()));
    }
    Ok((u16::from_be_bytes([data[1], data[2]]), u16::from_be_bytes([data[3], data[4]])))
}

fn single_write_fields(data: &[u8]) -> Result<(u16, u16)> {
    if data.len() < 5 {
        return Err(GatewayError::ShortFrame("expected address+value".into()));
    }
    Ok((u16::from_be_bytes([data[1], data[2]]), u16::from_be_bytes([data[3], data[4]])))
}

fn multi_write_header(data: &[u8]) -> Result<(u16, u16, u8)> {
    if data.len() < 6 {
        return Err(GatewayError::ShortFrame("expected multi-write header".into()));
    }
    Ok((
        u16::from_be_bytes([data[1], data[2]]),
        u16::from_be_bytes([data[3], data[4]]),
        data[5],
    ))
}

/// Pack booleans LSB-first into bytes.
fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(8)];
    for (i, &v) in values.iter().enumerate() {
        if v {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Unpack up to `count` LSB-first bits from `bytes`.
fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}
