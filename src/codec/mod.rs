//! Modbus wire codec: constants, PDU buffer, byte-order permutation, CRC-16, the PDU
//! tagged union, and the TCP/RTU streaming framers.

pub mod byte_order;
pub mod constants;
pub mod crc;
pub mod message;
pub mod pdu;
pub mod rtu;
pub mod tcp;
pub mod values;

pub use message::Pdu;
pub use pdu::ModbusPdu;
