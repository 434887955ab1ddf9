//! Framing for the session transport.
//!
//! Every message is `tag: u8`, `len: u32` (big endian), then `len` payload
//! bytes. The same framing is used in both directions.

use settings::constants::protocol::MAX_FRAME_LEN;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const TAG_DATA: u8 = 0;
const TAG_RESIZE: u8 = 1;
const TAG_PROCESS_NAME: u8 = 2;
const TAG_CWD: u8 = 3;
const TAG_REQUEST_CWD: u8 = 4;

/// One message on a session transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw terminal bytes. Client to backend: input. Backend to client: output.
    Data(Vec<u8>),
    Resize { cols: u16, rows: u16 },
    /// Foreground process name, sent by the backend when it changes.
    ProcessName(String),
    /// Working directory of the shell, sent on change or on request.
    Cwd(String),
    /// Ask the backend to report its working directory.
    RequestCwd,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown frame tag {0}")]
    UnknownTag(u8),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(u32),
    #[error("resize payload must be 4 bytes, got {0}")]
    MalformedResize(usize),
    #[error("frame text is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Frame {
    fn tag(&self) -> u8 {
        match self {
            Frame::Data(_) => TAG_DATA,
            Frame::Resize { .. } => TAG_RESIZE,
            Frame::ProcessName(_) => TAG_PROCESS_NAME,
            Frame::Cwd(_) => TAG_CWD,
            Frame::RequestCwd => TAG_REQUEST_CWD,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Frame::Data(bytes) => bytes.clone(),
            Frame::Resize { cols, rows } => {
                let mut payload = Vec::with_capacity(4);
                payload.extend_from_slice(&cols.to_be_bytes());
                payload.extend_from_slice(&rows.to_be_bytes());
                payload
            }
            Frame::ProcessName(text) | Frame::Cwd(text) => text.as_bytes().to_vec(),
            Frame::RequestCwd => Vec::new(),
        }
    }

    /// Serialize the frame, header included.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = Vec::with_capacity(5 + payload.len());
        out.push(self.tag());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
        out
    }

    fn decode(tag: u8, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        match tag {
            TAG_DATA => Ok(Frame::Data(payload)),
            TAG_RESIZE => {
                let &[c0, c1, r0, r1] = payload.as_slice() else {
                    return Err(ProtocolError::MalformedResize(payload.len()));
                };
                Ok(Frame::Resize {
                    cols: u16::from_be_bytes([c0, c1]),
                    rows: u16::from_be_bytes([r0, r1]),
                })
            }
            TAG_PROCESS_NAME => Ok(Frame::ProcessName(String::from_utf8(payload)?)),
            TAG_CWD => Ok(Frame::Cwd(String::from_utf8(payload)?)),
            TAG_REQUEST_CWD => Ok(Frame::RequestCwd),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// Read one frame. Returns `Ok(None)` when the peer closed the stream
/// cleanly between frames.
///
/// Not cancel safe: a partially read frame is lost if the future is dropped.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Frame::decode(tag, payload).map(Some)
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}
