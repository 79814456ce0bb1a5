//! Length-prefixed framing with optional zlib compression.
//!
//! Uncompressed frames are `VarInt(len) ++ packet`. Once compression is on,
//! every frame becomes `VarInt(len) ++ VarInt(data_len) ++ body`, where a
//! `data_len` of zero marks a body sent as-is and any other value is the
//! inflated size of a zlib body.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::TransportError;

/// Largest frame a three-byte length prefix can describe.
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// Largest inflated packet accepted from a compressed frame.
pub const MAX_UNCOMPRESSED_LEN: usize = 8_388_608;

const MAX_LENGTH_PREFIX: usize = 3;
const MAX_VARINT_BYTES: usize = 5;

fn put_varint(buf: &mut BytesMut, value: usize) {
    let mut value = value as u32;
    loop {
        if value & !0x7f == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
}

fn varint_len(value: usize) -> usize {
    let mut value = value as u32;
    let mut len = 1;
    while value & !0x7f != 0 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Reads a VarInt from the front of `buf` without consuming it.
///
/// `Ok(None)` means more bytes are needed.
fn peek_varint(buf: &[u8], max_bytes: usize) -> Result<Option<(usize, usize)>, TransportError> {
    let mut value: u32 = 0;
    for (i, byte) in buf.iter().enumerate() {
        if i >= max_bytes {
            break;
        }
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as usize, i + 1)));
        }
    }
    if buf.len() >= max_bytes {
        return Err(TransportError::BadFrame(format!(
            "length prefix longer than {max_bytes} bytes"
        )));
    }
    Ok(None)
}

/// Frames one packet for the wire.
pub fn encode_frame(packet: &[u8], compression: Option<u32>) -> Result<BytesMut, TransportError> {
    let Some(threshold) = compression else {
        if packet.len() > MAX_FRAME_LEN {
            return Err(TransportError::BadFrame(format!(
                "packet of {} bytes exceeds {MAX_FRAME_LEN}",
                packet.len()
            )));
        }
        let mut frame = BytesMut::with_capacity(packet.len() + MAX_LENGTH_PREFIX);
        put_varint(&mut frame, packet.len());
        frame.put_slice(packet);
        return Ok(frame);
    };

    let mut body = BytesMut::with_capacity(packet.len() + MAX_VARINT_BYTES);
    if packet.len() >= threshold as usize {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(packet)
            .map_err(TransportError::Compression)?;
        let compressed = encoder.finish().map_err(TransportError::Compression)?;
        put_varint(&mut body, packet.len());
        body.put_slice(&compressed);
    } else {
        put_varint(&mut body, 0);
        body.put_slice(packet);
    }
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::BadFrame(format!(
            "compressed frame of {} bytes exceeds {MAX_FRAME_LEN}",
            body.len()
        )));
    }
    let mut frame = BytesMut::with_capacity(body.len() + varint_len(body.len()));
    put_varint(&mut frame, body.len());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Splits a byte stream back into packets.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_len: usize,
    compression: Option<u32>,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame_len: max_frame_len.min(MAX_FRAME_LEN),
            compression: None,
        }
    }

    pub fn set_compression(&mut self, threshold: Option<u32>) {
        self.compression = threshold;
    }

    pub fn compression(&self) -> Option<u32> {
        self.compression
    }

    /// Appends bytes read from the stream (already decrypted).
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether a partial frame is waiting for more bytes.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Pops the next complete packet, if the buffer holds one.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let Some((len, header)) = peek_varint(&self.buf, MAX_LENGTH_PREFIX)? else {
            return Ok(None);
        };
        if len > self.max_frame_len {
            return Err(TransportError::BadFrame(format!(
                "frame of {len} bytes exceeds {}",
                self.max_frame_len
            )));
        }
        if self.buf.len() < header + len {
            return Ok(None);
        }
        self.buf.advance(header);
        let body = self.buf.split_to(len);
        match self.compression {
            None => Ok(Some(body.to_vec())),
            Some(threshold) => inflate(&body, threshold).map(Some),
        }
    }
}

fn inflate(body: &[u8], threshold: u32) -> Result<Vec<u8>, TransportError> {
    let Some((data_len, header)) = peek_varint(body, MAX_VARINT_BYTES)? else {
        return Err(TransportError::BadFrame("truncated data length".into()));
    };
    let rest = &body[header..];
    if data_len == 0 {
        return Ok(rest.to_vec());
    }
    if data_len < threshold as usize {
        return Err(TransportError::BadFrame(format!(
            "compressed packet of {data_len} bytes is below the threshold of {threshold}"
        )));
    }
    if data_len > MAX_UNCOMPRESSED_LEN {
        return Err(TransportError::BadFrame(format!(
            "compressed packet of {data_len} bytes exceeds {MAX_UNCOMPRESSED_LEN}"
        )));
    }
    let mut packet = Vec::with_capacity(data_len);
    ZlibDecoder::new(rest)
        .take(data_len as u64 + 1)
        .read_to_end(&mut packet)
        .map_err(TransportError::Compression)?;
    if packet.len() != data_len {
        return Err(TransportError::BadFrame(format!(
            "inflated {} bytes, header announced {data_len}",
            packet.len()
        )));
    }
    Ok(packet)
}
