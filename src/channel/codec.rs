//! 9P2000 envelope codec.
//!
//! Each frame is `size[4] type[1] tag[2] body`, all integers little-endian,
//! where `size` counts the whole frame including itself. Strings inside
//! bodies are `len[2]` followed by UTF-8 bytes.
//!
//! Only the bodies the transport itself interprets are decoded
//! (`Tversion`, `Rversion`, `Tflush`, `Rflush`, `Rerror`); everything else
//! is kept as [`Message::Opaque`].

use crate::config::HEADER_SIZE;
use crate::error::ChannelError;
use crate::frame::{Frame, FrameType, Message, Rerror, Tag, Version};

const HEADER_LEN: usize = HEADER_SIZE as usize;

/// Encode a frame into its wire representation.
pub fn encode(frame: &Frame, max_size: usize) -> Result<Vec<u8>, ChannelError> {
    let mut out = vec![0u8; 4];
    out.push(frame.ty.as_u8());
    out.extend_from_slice(&frame.tag.as_u16().to_le_bytes());

    match &frame.message {
        Message::Tversion(v) | Message::Rversion(v) => {
            out.extend_from_slice(&v.msize.to_le_bytes());
            put_string(&mut out, &v.version, frame.ty)?;
        }
        Message::Tflush { oldtag } => out.extend_from_slice(&oldtag.as_u16().to_le_bytes()),
        Message::Rflush => {}
        Message::Rerror(e) => put_string(&mut out, &e.ename, frame.ty)?,
        Message::Opaque { body, .. } => out.extend_from_slice(body),
    }

    if out.len() > max_size {
        return Err(ChannelError::FrameTooLarge {
            size: out.len(),
            max: max_size,
        });
    }
    let size = u32::try_from(out.len()).map_err(|_| ChannelError::FrameTooLarge {
        size: out.len(),
        max: max_size,
    })?;
    out[..4].copy_from_slice(&size.to_le_bytes());
    Ok(out)
}

/// Inspect the first bytes of `buf` and return the length of the frame that
/// starts there, or `None` when fewer than four bytes are available.
pub fn frame_len(buf: &[u8], max_size: usize) -> Result<Option<usize>, ChannelError> {
    let Some(prefix) = buf.get(..4) else {
        return Ok(None);
    };
    let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if size < HEADER_LEN {
        return Err(ChannelError::FrameTooShort(size));
    }
    if size > max_size {
        return Err(ChannelError::FrameTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(Some(size))
}

/// Decode exactly one frame. `buf` must hold the whole frame, size prefix included.
pub fn decode(buf: &[u8]) -> Result<Frame, ChannelError> {
    if buf.len() < HEADER_LEN {
        return Err(ChannelError::FrameTooShort(buf.len()));
    }
    let ty = FrameType::new(buf[4]);
    let tag = Tag::new(u16::from_le_bytes([buf[5], buf[6]]));
    let body = &buf[HEADER_LEN..];

    let message = match ty {
        FrameType::TVERSION => Message::Tversion(version_body(ty, body)?),
        FrameType::RVERSION => Message::Rversion(version_body(ty, body)?),
        FrameType::TFLUSH => {
            let mut cursor = Cursor::new(ty, body);
            let oldtag = Tag::new(cursor.u16()?);
            cursor.finish()?;
            Message::Tflush { oldtag }
        }
        FrameType::RFLUSH => {
            Cursor::new(ty, body).finish()?;
            Message::Rflush
        }
        FrameType::RERROR => match error_body(body) {
            Some(e) => Message::Rerror(e),
            // Keep the frame; the caller reports a malformed error reply.
            None => Message::Opaque {
                ty,
                body: body.to_vec(),
            },
        },
        _ => Message::Opaque {
            ty,
            body: body.to_vec(),
        },
    };

    Ok(Frame { ty, tag, message })
}

fn version_body(ty: FrameType, body: &[u8]) -> Result<Version, ChannelError> {
    let mut cursor = Cursor::new(ty, body);
    let msize = cursor.u32()?;
    let version = cursor.string()?;
    cursor.finish()?;
    Ok(Version { msize, version })
}

fn error_body(body: &[u8]) -> Option<Rerror> {
    let mut cursor = Cursor::new(FrameType::RERROR, body);
    let ename = cursor.string().ok()?;
    cursor.finish().ok()?;
    Some(Rerror { ename })
}

fn put_string(out: &mut Vec<u8>, s: &str, ty: FrameType) -> Result<(), ChannelError> {
    let len = u16::try_from(s.len())
        .map_err(|_| ChannelError::decode(ty, format!("string of {} bytes", s.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

struct Cursor<'a> {
    ty: FrameType,
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(ty: FrameType, buf: &'a [u8]) -> Self {
        Self { ty, buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ChannelError> {
        if self.buf.len() < n {
            return Err(ChannelError::decode(
                self.ty,
                format!("need {} bytes, have {}", n, self.buf.len()),
            ));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16, ChannelError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ChannelError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, ChannelError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ChannelError::decode(self.ty, format!("invalid utf-8: {}", e)))
    }

    fn finish(self) -> Result<(), ChannelError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::decode(
                self.ty,
                format!("{} trailing bytes", self.buf.len()),
            ))
        }
    }
}
