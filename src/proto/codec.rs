//! Frame encoding and streaming decode.
//!
//! Encoders are infallible given valid in-memory values. Decoders operate
//! on a stream buffer and return [`DecodeResult`]: `Complete` consumes the
//! frame's bytes, `Incomplete` leaves the buffer untouched so the caller
//! can read more, and `Invalid` means the connection must be closed.
//!
//! "Clean EOF" is a property of the connection, not the buffer: EOF with
//! an empty buffer is a clean close, EOF with a partial frame is a
//! truncated-frame error. The connection loop makes that distinction.

use super::{Command, DecodeResult, GetResponse, Status};
use super::{TAG_DELETE, TAG_GET, TAG_JOIN, TAG_SET};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encode a command frame.
pub fn encode_command(cmd: &Command) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame_size_hint(cmd));
    buf.put_u8(cmd.tag());

    match cmd {
        Command::Set {
            key,
            value,
            ttl_seconds,
        } => {
            put_prefixed(&mut buf, key);
            put_prefixed(&mut buf, value);
            buf.put_i32_le(*ttl_seconds);
        }
        Command::Get { key } | Command::Delete { key } => {
            put_prefixed(&mut buf, key);
        }
        Command::Join => {}
    }

    buf.freeze()
}

/// Encode a SET response (status only).
pub fn encode_set_response(status: Status) -> Bytes {
    Bytes::from(vec![status as u8])
}

/// Encode a DELETE response (status only).
pub fn encode_delete_response(status: Status) -> Bytes {
    Bytes::from(vec![status as u8])
}

/// Encode a GET response. On non-OK statuses the value length is forced
/// to zero so the parser on the far side stays frame-aligned.
pub fn encode_get_response(resp: &GetResponse) -> Bytes {
    let value: &[u8] = if resp.status == Status::Ok {
        &resp.value
    } else {
        &[]
    };

    let mut buf = BytesMut::with_capacity(1 + 4 + value.len());
    buf.put_u8(resp.status as u8);
    buf.put_i32_le(value.len() as i32);
    buf.put_slice(value);
    buf.freeze()
}

/// Decode one command frame from the front of `buf`.
pub fn decode_command(buf: &mut BytesMut) -> DecodeResult<Command> {
    let mut cursor = FrameCursor::new(buf);

    let tag = match cursor.take_u8() {
        Some(t) => t,
        None => return DecodeResult::Incomplete,
    };

    let result = match tag {
        TAG_SET => decode_set(&mut cursor),
        TAG_GET => cursor.take_prefixed().map(|k| k.map(|key| Command::Get { key })),
        TAG_DELETE => cursor
            .take_prefixed()
            .map(|k| k.map(|key| Command::Delete { key })),
        TAG_JOIN => Ok(Some(Command::Join)),
        other => Err(format!("unknown command tag {}", other)),
    };

    finish(buf, cursor.pos, result)
}

fn decode_set(cursor: &mut FrameCursor<'_>) -> Result<Option<Command>, String> {
    let key = match cursor.take_prefixed()? {
        Some(k) => k,
        None => return Ok(None),
    };
    let value = match cursor.take_prefixed()? {
        Some(v) => v,
        None => return Ok(None),
    };
    let ttl_seconds = match cursor.take_i32() {
        Some(t) => t,
        None => return Ok(None),
    };
    Ok(Some(Command::Set {
        key,
        value,
        ttl_seconds,
    }))
}

/// Decode a status-only response frame (SET or DELETE).
pub fn decode_status_response(buf: &mut BytesMut) -> DecodeResult<Status> {
    let mut cursor = FrameCursor::new(buf);
    let result = match cursor.take_u8() {
        None => Ok(None),
        Some(tag) => match Status::from_u8(tag) {
            Some(status) => Ok(Some(status)),
            None => Err(format!("unknown status tag {}", tag)),
        },
    };
    finish(buf, cursor.pos, result)
}

/// Decode a GET response frame (status, value length, value).
pub fn decode_get_response(buf: &mut BytesMut) -> DecodeResult<GetResponse> {
    let mut cursor = FrameCursor::new(buf);

    let result = (|| {
        let tag = match cursor.take_u8() {
            Some(t) => t,
            None => return Ok(None),
        };
        let status =
            Status::from_u8(tag).ok_or_else(|| format!("unknown status tag {}", tag))?;
        // The length and value fields are present even on non-OK statuses.
        let value = match cursor.take_prefixed()? {
            Some(v) => v,
            None => return Ok(None),
        };
        Ok(Some(GetResponse { status, value }))
    })();

    finish(buf, cursor.pos, result)
}

/// Consume `pos` bytes on success and translate the three-way outcome.
fn finish<T>(
    buf: &mut BytesMut,
    pos: usize,
    result: Result<Option<T>, String>,
) -> DecodeResult<T> {
    match result {
        Ok(Some(frame)) => {
            buf.advance(pos);
            DecodeResult::Complete(frame)
        }
        Ok(None) => DecodeResult::Incomplete,
        Err(reason) => DecodeResult::Invalid(reason),
    }
}

fn put_prefixed(buf: &mut BytesMut, payload: &[u8]) {
    buf.put_i32_le(payload.len() as i32);
    buf.put_slice(payload);
}

fn frame_size_hint(cmd: &Command) -> usize {
    match cmd {
        Command::Set { key, value, .. } => 1 + 4 + key.len() + 4 + value.len() + 4,
        Command::Get { key } | Command::Delete { key } => 1 + 4 + key.len(),
        Command::Join => 1,
    }
}

/// Non-consuming reader over the front of a stream buffer. Bytes are only
/// removed from the buffer once a whole frame has been read.
struct FrameCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameCursor<'a> {
    fn new(buf: &'a BytesMut) -> Self {
        Self {
            data: buf.as_ref(),
            pos: 0,
        }
    }

    fn take_u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take_i32(&mut self) -> Option<i32> {
        let end = self.pos.checked_add(4)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(i32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    /// Read an i32 length prefix followed by that many bytes.
    ///
    /// Ok(None) means the buffer ends first; Err means the length is
    /// negative (i32 values in the upper unsigned half are invalid).
    fn take_prefixed(&mut self) -> Result<Option<Bytes>, String> {
        let len = match self.take_i32() {
            Some(l) => l,
            None => return Ok(None),
        };
        if len < 0 {
            return Err(format!("negative length prefix {}", len));
        }

        let len = len as usize;
        let end = match self.pos.checked_add(len) {
            Some(e) => e,
            None => return Err("length prefix overflows".to_string()),
        };
        match self.data.get(self.pos..end) {
            Some(slice) => {
                let bytes = Bytes::copy_from_slice(slice);
                self.pos = end;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_cmd(key: &str, value: &str, ttl: i32) -> Command {
        Command::Set {
            key: Bytes::copy_from_slice(key.as_bytes()),
            value: Bytes::copy_from_slice(value.as_bytes()),
            ttl_seconds: ttl,
        }
    }

    fn decode_one(bytes: &[u8]) -> DecodeResult<Command> {
        let mut buf = BytesMut::from(bytes);
        decode_command(&mut buf)
    }

    #[test]
    fn set_round_trip() {
        let cmd = set_cmd("Foo", "Bar", 60);
        let encoded = encode_command(&cmd);

        // Tag, keyLen, key, valLen, val, ttl.
        assert_eq!(encoded[0], TAG_SET);
        assert_eq!(&encoded[1..5], &3i32.to_le_bytes());
        assert_eq!(&encoded[5..8], b"Foo");
        assert_eq!(&encoded[8..12], &3i32.to_le_bytes());
        assert_eq!(&encoded[12..15], b"Bar");
        assert_eq!(&encoded[15..19], &60i32.to_le_bytes());

        match decode_one(&encoded) {
            DecodeResult::Complete(decoded) => assert_eq!(decoded, cmd),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn get_round_trip() {
        let cmd = Command::Get {
            key: Bytes::from("mykey"),
        };
        let encoded = encode_command(&cmd);
        match decode_one(&encoded) {
            DecodeResult::Complete(decoded) => assert_eq!(decoded, cmd),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn delete_round_trip() {
        let cmd = Command::Delete {
            key: Bytes::from("mykey"),
        };
        let encoded = encode_command(&cmd);
        match decode_one(&encoded) {
            DecodeResult::Complete(decoded) => assert_eq!(decoded, cmd),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn join_round_trip() {
        let encoded = encode_command(&Command::Join);
        assert_eq!(encoded.as_ref(), &[TAG_JOIN]);
        match decode_one(&encoded) {
            DecodeResult::Complete(Command::Join) => {}
            other => panic!("expected Join, got {:?}", other),
        }
    }

    #[test]
    fn pipelined_frames_decode_in_order() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_command(&set_cmd("x", "y", 60)));
        buf.extend_from_slice(&encode_command(&Command::Get {
            key: Bytes::from("x"),
        }));

        match decode_command(&mut buf) {
            DecodeResult::Complete(Command::Set { key, .. }) => {
                assert_eq!(key.as_ref(), b"x")
            }
            other => panic!("expected Set first, got {:?}", other),
        }
        match decode_command(&mut buf) {
            DecodeResult::Complete(Command::Get { key }) => assert_eq!(key.as_ref(), b"x"),
            other => panic!("expected Get second, got {:?}", other),
        }
        assert!(buf.is_empty(), "no leftover bytes between frames");
    }

    #[test]
    fn truncation_is_never_complete() {
        let encoded = encode_command(&set_cmd("somekey", "somevalue", 300));
        // Every strict prefix must decode as Incomplete, never Complete.
        for cut in 0..encoded.len() {
            let mut buf = BytesMut::from(&encoded[..cut]);
            match decode_command(&mut buf) {
                DecodeResult::Incomplete => {}
                other => panic!("prefix of {} bytes decoded as {:?}", cut, other),
            }
            assert_eq!(buf.len(), cut, "Incomplete must not consume bytes");
        }
    }

    #[test]
    fn unknown_tag_is_invalid() {
        match decode_one(&[9, 0, 0, 0, 0]) {
            DecodeResult::Invalid(reason) => assert!(reason.contains("unknown command tag")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn negative_length_is_invalid() {
        let mut buf = BytesMut::new();
        buf.put_u8(TAG_GET);
        buf.put_i32_le(-1);
        match decode_command(&mut buf) {
            DecodeResult::Invalid(reason) => assert!(reason.contains("negative length")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn upper_half_length_is_invalid() {
        // 0xFFFF_FFFF as i32 is -1: lengths in the upper unsigned half
        // are rejected rather than allocated.
        let mut buf = BytesMut::new();
        buf.put_u8(TAG_SET);
        buf.put_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        match decode_command(&mut buf) {
            DecodeResult::Invalid(_) => {}
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn empty_buffer_is_incomplete() {
        let mut buf = BytesMut::new();
        assert!(matches!(decode_command(&mut buf), DecodeResult::Incomplete));
    }

    #[test]
    fn set_response_round_trip() {
        for status in [Status::Ok, Status::Error, Status::NotLeader] {
            let encoded = encode_set_response(status);
            let mut buf = BytesMut::from(encoded.as_ref());
            match decode_status_response(&mut buf) {
                DecodeResult::Complete(decoded) => assert_eq!(decoded, status),
                other => panic!("expected Complete, got {:?}", other),
            }
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn get_response_ok_round_trip() {
        let resp = GetResponse::ok(Bytes::from("Bar"));
        let encoded = encode_get_response(&resp);
        let mut buf = BytesMut::from(encoded.as_ref());
        match decode_get_response(&mut buf) {
            DecodeResult::Complete(decoded) => assert_eq!(decoded, resp),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn get_response_miss_has_empty_value() {
        let resp = GetResponse::status(Status::KeyNotFound);
        let encoded = encode_get_response(&resp);

        // Status, then a zero length, then nothing.
        assert_eq!(encoded.len(), 5);
        assert_eq!(encoded[0], Status::KeyNotFound as u8);
        assert_eq!(&encoded[1..5], &0i32.to_le_bytes());

        let mut buf = BytesMut::from(encoded.as_ref());
        match decode_get_response(&mut buf) {
            DecodeResult::Complete(decoded) => {
                assert_eq!(decoded.status, Status::KeyNotFound);
                assert!(decoded.value.is_empty());
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn get_response_non_ok_never_carries_value() {
        // Even if a caller builds a non-OK response with a value in it,
        // the encoder forces the length to zero.
        let resp = GetResponse {
            status: Status::Error,
            value: Bytes::from("should not appear"),
        };
        let encoded = encode_get_response(&resp);
        assert_eq!(encoded.len(), 5);
        assert_eq!(&encoded[1..5], &0i32.to_le_bytes());
    }

    #[test]
    fn empty_key_and_value_encode() {
        // Zero-length keys/values are representable on the wire; the
        // cache layer is what rejects them.
        let cmd = set_cmd("", "", 1);
        let encoded = encode_command(&cmd);
        match decode_one(&encoded) {
            DecodeResult::Complete(decoded) => assert_eq!(decoded, cmd),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn negative_ttl_survives_the_wire() {
        // The codec carries the raw i32; TTL validation is the cache's.
        let cmd = set_cmd("k", "v", -7);
        match decode_one(&encode_command(&cmd)) {
            DecodeResult::Complete(Command::Set { ttl_seconds, .. }) => {
                assert_eq!(ttl_seconds, -7)
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn invalid_does_not_consume() {
        let mut buf = BytesMut::new();
        buf.put_u8(99);
        buf.put_slice(b"garbage");
        let before = buf.len();
        match decode_command(&mut buf) {
            DecodeResult::Invalid(_) => {}
            other => panic!("expected Invalid, got {:?}", other),
        }
        // The caller closes the connection; the buffer is left alone.
        assert_eq!(buf.len(), before);
    }
}
