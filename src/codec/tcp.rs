//! TCP MBAP framing: `TID(2) PID(2)=0 LEN(2) UID(1) || PDU`, all big-endian.

use bytes::{Buf, BytesMut};

use crate::error::{GatewayError, Result};

use super::constants::{mbap_length_field, MBAP_PREFIX_LEN, MAX_MBAP_LENGTH};
use super::pdu::ModbusPdu;

/// Serialize one MBAP frame: header followed by the PDU bytes.
pub fn serialize(transaction_id: u16, unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let mut out = Vec::with_capacity(MBAP_PREFIX_LEN + 1 + pdu.len());
    out.extend_from_slice(&transaction_id.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // protocol id, always 0
    out.extend_from_slice(&mbap_length_field(pdu.len()).to_be_bytes());
    out.push(unit_id);
    out.extend_from_slice(pdu.as_slice());
    out
}

/// One fully decoded MBAP frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpFrame {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub pdu: ModbusPdu,
}

/// Streaming MBAP de-framer: feed it arbitrary byte chunks, drain complete frames.
///
/// Buffers until at least 6 bytes (prefix) are available, then until `6 + length`
/// bytes are available.
#[derive(Debug, Default)]
pub struct TcpFramer {
    buf: BytesMut,
}

impl TcpFramer {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Append newly-received bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull the next fully-buffered frame, if any. Call repeatedly to drain all
    /// frames available after a `feed`.
    pub fn next_frame(&mut self) -> Result<Option<TcpFrame>> {
        if self.buf.len() < MBAP_PREFIX_LEN {
            return Ok(None);
        }
        let length = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
        if length == 0 || length > MAX_MBAP_LENGTH {
            return Err(GatewayError::Protocol(format!("invalid MBAP length field: {}", length)));
        }
        let total = MBAP_PREFIX_LEN + length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let transaction_id = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        let unit_id = self.buf[6];
        let pdu_bytes = &self.buf[7..total];
        let pdu = ModbusPdu::from_slice(pdu_bytes)?;

        self.buf.advance(total);
        Ok(Some(TcpFrame { transaction_id, unit_id, pdu }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::Pdu;

    #[test]
    fn serialize_read_holding_registers_request() {
        let req = Pdu::ReadHoldingRegistersReq { address: 0x006B, count: 3 };
        let pdu = req.encode().unwrap();
        let bytes = serialize(1, 0x11, &pdu);
        assert_eq!(bytes, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn parses_s1_server_reply_in_one_shot() {
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64];
        let mut framer = TcpFramer::new();
        framer.feed(&bytes);
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.transaction_id, 1);
        assert_eq!(frame.unit_id, 0x11);
        let resp = Pdu::decode_response(&frame.pdu, 0x03).unwrap();
        assert_eq!(resp, Pdu::ReadHoldingRegistersResp { registers: vec![0x022B, 0x0000, 0x0064] });
        assert!(framer.next_frame().unwrap().is_none());
    }

    #[test]
    fn round_trip_every_split_of_a_valid_frame() {
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64];
        for split in 0..=bytes.len() {
            let mut framer = TcpFramer::new();
            framer.feed(&bytes[..split]);
            framer.feed(&bytes[split..]);
            let frame = framer.next_frame().unwrap().unwrap();
            assert_eq!(frame.unit_id, 0x11);
        }
    }

    #[test]
    fn byte_at_a_time_streaming_still_parses() {
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64];
        let mut framer = TcpFramer::new();
        for b in bytes {
            framer.feed(&[b]);
        }
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.transaction_id, 1);
    }

    #[test]
    fn two_back_to_back_frames_both_drain() {
        let one = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let two = [0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x01, 0x00, 0x01];
        let mut framer = TcpFramer::new();
        framer.feed(&one);
        framer.feed(&two);
        let f1 = framer.next_frame().unwrap().unwrap();
        let f2 = framer.next_frame().unwrap().unwrap();
        assert_eq!(f1.transaction_id, 1);
        assert_eq!(f2.transaction_id, 2);
        assert!(framer.next_frame().unwrap().is_none());
    }

    #[test]
    fn rejects_zero_length_field() {
        let mut framer = TcpFramer::new();
        framer.feed(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        assert!(framer.next_frame().is_err());
    }
}
