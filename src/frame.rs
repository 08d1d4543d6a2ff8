//! Length-prefixed frame codec using Java's modified UTF-8 string encoding.
//!
//! A frame is a 2-byte big-endian length followed by exactly that many bytes
//! of modified UTF-8 text, matching `DataOutputStream.writeUTF` and
//! `DataInputStream.readUTF`. The length counts encoded bytes, not
//! characters, so non-ASCII text encodes to more bytes than characters.
//!
//! Modified UTF-8 differs from standard UTF-8 in two ways:
//! - U+0000 is encoded as the two-byte sequence `C0 80` (no embedded NULs)
//! - Supplementary code points are encoded as a CESU-8 surrogate pair
//!   (two three-byte groups, six bytes total) instead of one four-byte group

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum encoded payload size representable by the 2-byte length prefix.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Frame codec errors
#[derive(Debug)]
pub enum FrameError {
    /// Encoded payload exceeds the 16-bit length prefix
    Oversized { encoded_len: usize },
    /// Connection closed or timed out before a full frame arrived
    Truncated,
    /// Payload bytes are not valid modified UTF-8
    InvalidEncoding { offset: usize },
    /// Underlying socket failure
    Io(std::io::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Oversized { encoded_len } => write!(
                f,
                "Encoded payload is {} bytes, exceeding the {} byte frame limit",
                encoded_len, MAX_FRAME_PAYLOAD
            ),
            FrameError::Truncated => write!(f, "Connection closed mid-frame"),
            FrameError::InvalidEncoding { offset } => {
                write!(f, "Invalid modified UTF-8 at byte offset {}", offset)
            }
            FrameError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    }
}

/// Read one frame and decode its payload.
///
/// Reads exactly 2 length bytes, then exactly that many payload bytes.
/// Bytes belonging to a subsequent frame are left unread for a future call.
pub async fn read_frame<R>(reader: &mut R) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await?;
    let len = usize::from(u16::from_be_bytes(len_buf));

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    decode_mutf8(&payload)
}

/// Encode `text` and write it as one frame.
///
/// Fails with [`FrameError::Oversized`] before any bytes are written if the
/// encoded length does not fit the 2-byte prefix.
pub async fn write_frame<W>(writer: &mut W, text: &str) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode_mutf8(text);
    if encoded.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::Oversized {
            encoded_len: encoded.len(),
        });
    }

    // Assemble prefix and payload into one buffer so the frame goes out in
    // a single write.
    let mut buf = BytesMut::with_capacity(2 + encoded.len());
    buf.put_u16(encoded.len() as u16);
    buf.extend_from_slice(&encoded);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode a string as modified UTF-8.
pub fn encode_mutf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let cp = ch as u32;
        match cp {
            0 => {
                out.push(0xC0);
                out.push(0x80);
            }
            0x01..=0x7F => out.push(cp as u8),
            0x80..=0x7FF => {
                out.push(0xC0 | (cp >> 6) as u8);
                out.push(0x80 | (cp & 0x3F) as u8);
            }
            0x800..=0xFFFF => push_three_byte(&mut out, cp),
            _ => {
                // Supplementary plane: encode the UTF-16 surrogate pair,
                // each half as a three-byte group (CESU-8)
                let v = cp - 0x1_0000;
                push_three_byte(&mut out, 0xD800 + (v >> 10));
                push_three_byte(&mut out, 0xDC00 + (v & 0x3FF));
            }
        }
    }
    out
}

fn push_three_byte(out: &mut Vec<u8>, cp: u32) {
    out.push(0xE0 | (cp >> 12) as u8);
    out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
    out.push(0x80 | (cp & 0x3F) as u8);
}

/// Decode modified UTF-8 bytes into a string.
///
/// Rejects malformed sequences, truncated multi-byte groups, and unpaired
/// surrogates, reporting the byte offset of the offending group.
pub fn decode_mutf8(bytes: &[u8]) -> Result<String, FrameError> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let cp = decode_group(bytes, &mut i)?;

        let ch = if (0xD800..=0xDBFF).contains(&cp) {
            // High surrogate; the low half must follow as another
            // three-byte group
            let low = decode_group(bytes, &mut i)?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(FrameError::InvalidEncoding { offset: start });
            }
            let combined = 0x1_0000 + ((cp - 0xD800) << 10) + (low - 0xDC00);
            char::from_u32(combined).ok_or(FrameError::InvalidEncoding { offset: start })?
        } else if (0xDC00..=0xDFFF).contains(&cp) {
            // Low surrogate with no preceding high half
            return Err(FrameError::InvalidEncoding { offset: start });
        } else {
            char::from_u32(cp).ok_or(FrameError::InvalidEncoding { offset: start })?
        };

        out.push(ch);
    }

    Ok(out)
}

/// Decode one byte group at `*i`, advancing past it.
fn decode_group(bytes: &[u8], i: &mut usize) -> Result<u32, FrameError> {
    let offset = *i;
    let b1 = *bytes
        .get(offset)
        .ok_or(FrameError::InvalidEncoding { offset })?;

    if b1 & 0x80 == 0 {
        *i += 1;
        Ok(u32::from(b1))
    } else if b1 & 0xE0 == 0xC0 {
        let b2 = continuation(bytes, offset + 1, offset)?;
        *i += 2;
        Ok((u32::from(b1 & 0x1F) << 6) | u32::from(b2 & 0x3F))
    } else if b1 & 0xF0 == 0xE0 {
        let b2 = continuation(bytes, offset + 1, offset)?;
        let b3 = continuation(bytes, offset + 2, offset)?;
        *i += 3;
        Ok((u32::from(b1 & 0x0F) << 12) | (u32::from(b2 & 0x3F) << 6) | u32::from(b3 & 0x3F))
    } else {
        // 4-byte standard UTF-8 leads are not valid in modified UTF-8
        Err(FrameError::InvalidEncoding { offset })
    }
}

/// Fetch a continuation byte (must match `10xxxxxx`).
fn continuation(bytes: &[u8], at: usize, group_offset: usize) -> Result<u8, FrameError> {
    let b = *bytes.get(at).ok_or(FrameError::InvalidEncoding {
        offset: group_offset,
    })?;
    if b & 0xC0 != 0x80 {
        return Err(FrameError::InvalidEncoding {
            offset: group_offset,
        });
    }
    Ok(b)
}
