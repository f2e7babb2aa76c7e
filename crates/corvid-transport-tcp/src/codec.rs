//! 帧编解码：9 字节帧头 + 消息体，取值与原生协议 v4 对齐。
//!
//! # 教案式注释
//!
//! ## 意图 (Why)
//! - 握手只涉及少量消息类型，这里实现它们的最小编解码，客户端通道与测试用的服务端帧流共用同一份代码，
//!   避免两端各自维护导致格式漂移。
//!
//! ## 逻辑 (How)
//! - 帧头：`version(u8) | flags(u8) | stream(i16) | opcode(u8) | length(u32)`，均为大端；
//!   请求的 version 为 `0x04`，响应在最高位置 1 得到 `0x84`；
//! - 消息体原语：`[string]` 以 u16 长度前缀，`[bytes]` 以 i32 长度前缀且 `-1` 表示空值，
//!   `[string map]`/`[string multimap]` 以 u16 项数前缀。
//!
//! ## 契约 (What)
//! - 解码严格校验方向（请求/响应）、操作码、长度上限与尾随字节；任何违规都以 [`FrameError`] 返回，
//!   由上层映射为 `ProtocolViolation`；
//! - [`read_frame`] 在对端正常关闭时返回 [`FrameError::ConnectionClosed`]。

use std::{collections::BTreeMap, io};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use corvid_core::protocol::{Opcode, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const HEADER_LEN: usize = 9;
pub const PROTOCOL_VERSION: u8 = 0x04;
/// 消息体上限，与服务端默认的原生协议帧上限一致。
pub const MAX_BODY_LEN: usize = 256 * 1024 * 1024;

const RESPONSE_FLAG: u8 = 0x80;

/// 编解码失败的原因。
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unsupported protocol version byte {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("opcode {0:?} is not valid in this direction")]
    UnexpectedOpcode(Opcode),
    #[error("frame body of {0} bytes exceeds the limit")]
    BodyTooLarge(usize),
    #[error("{0} does not fit its {1}-bit length prefix")]
    LengthOverflow(usize, u8),
    #[error("truncated frame body")]
    Truncated,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 解析后的帧头。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub flags: u8,
    pub stream: i16,
    pub opcode: Opcode,
    pub length: usize,
}

impl FrameHeader {
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self, FrameError> {
        let mut buf = &raw[..];
        let version = buf.get_u8();
        if version & !RESPONSE_FLAG != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let flags = buf.get_u8();
        let stream = buf.get_i16();
        let raw_opcode = buf.get_u8();
        let opcode = Opcode::from_u8(raw_opcode).ok_or(FrameError::UnknownOpcode(raw_opcode))?;
        let length = buf.get_u32() as usize;
        if length > MAX_BODY_LEN {
            return Err(FrameError::BodyTooLarge(length));
        }
        Ok(Self {
            version,
            flags,
            stream,
            opcode,
            length,
        })
    }

    pub fn is_response(&self) -> bool {
        self.version & RESPONSE_FLAG != 0
    }
}

/// 编码请求帧；字段长度超出前缀表示范围时返回 [`FrameError::LengthOverflow`]。
pub fn encode_request(stream: i16, request: &Request) -> Result<Bytes, FrameError> {
    let mut body = BytesMut::new();
    match request {
        Request::Startup { options } => put_string_map(&mut body, options)?,
        Request::AuthResponse { token } => put_bytes(&mut body, token.as_deref())?,
        Request::Options => {}
    }
    assemble(PROTOCOL_VERSION, stream, request.opcode(), body)
}

/// 编码响应帧。
pub fn encode_response(stream: i16, response: &Response) -> Result<Bytes, FrameError> {
    let mut body = BytesMut::new();
    match response {
        Response::Ready => {}
        Response::Authenticate { mechanism } => put_string(&mut body, mechanism)?,
        Response::AuthChallenge { token } | Response::AuthSuccess { token } => {
            put_bytes(&mut body, token.as_deref())?
        }
        Response::Supported { options } => put_string_multimap(&mut body, options)?,
        Response::Error { code, message } => {
            body.put_i32(*code);
            put_string(&mut body, message)?;
        }
    }
    assemble(
        PROTOCOL_VERSION | RESPONSE_FLAG,
        stream,
        response.opcode(),
        body,
    )
}

/// 按帧头解码请求体。
pub fn decode_request(header: &FrameHeader, mut body: Bytes) -> Result<Request, FrameError> {
    if header.is_response() {
        return Err(FrameError::UnsupportedVersion(header.version));
    }
    let request = match header.opcode {
        Opcode::Startup => Request::Startup {
            options: get_string_map(&mut body)?,
        },
        Opcode::AuthResponse => Request::AuthResponse {
            token: get_bytes(&mut body)?,
        },
        Opcode::Options => Request::Options,
        other => return Err(FrameError::UnexpectedOpcode(other)),
    };
    ensure_consumed(&body)?;
    Ok(request)
}

/// 按帧头解码响应体。
pub fn decode_response(header: &FrameHeader, mut body: Bytes) -> Result<Response, FrameError> {
    if !header.is_response() {
        return Err(FrameError::UnsupportedVersion(header.version));
    }
    let response = match header.opcode {
        Opcode::Ready => Response::Ready,
        Opcode::Authenticate => Response::Authenticate {
            mechanism: get_string(&mut body)?,
        },
        Opcode::AuthChallenge => Response::AuthChallenge {
            token: get_bytes(&mut body)?,
        },
        Opcode::AuthSuccess => Response::AuthSuccess {
            token: get_bytes(&mut body)?,
        },
        Opcode::Supported => Response::Supported {
            options: get_string_multimap(&mut body)?,
        },
        Opcode::Error => {
            ensure_remaining(&body, 4)?;
            let code = body.get_i32();
            Response::Error {
                code,
                message: get_string(&mut body)?,
            }
        }
        other => return Err(FrameError::UnexpectedOpcode(other)),
    };
    ensure_consumed(&body)?;
    Ok(response)
}

/// 从异步读端读取一帧完整数据。
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Bytes), FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    match reader.read_exact(&mut raw).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(err) => return Err(FrameError::Io(err)),
    }
    let header = FrameHeader::decode(&raw)?;
    let mut body = vec![0u8; header.length];
    reader.read_exact(&mut body).await.map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(err)
        }
    })?;
    Ok((header, Bytes::from(body)))
}

fn assemble(
    version: u8,
    stream: i16,
    opcode: Opcode,
    body: BytesMut,
) -> Result<Bytes, FrameError> {
    if body.len() > MAX_BODY_LEN {
        return Err(FrameError::BodyTooLarge(body.len()));
    }
    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u8(version);
    frame.put_u8(0);
    frame.put_i16(stream);
    frame.put_u8(opcode.as_u8());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

fn short_len(len: usize) -> Result<u16, FrameError> {
    u16::try_from(len).map_err(|_| FrameError::LengthOverflow(len, 16))
}

fn put_string(dst: &mut BytesMut, value: &str) -> Result<(), FrameError> {
    dst.put_u16(short_len(value.len())?);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn put_bytes(dst: &mut BytesMut, value: Option<&[u8]>) -> Result<(), FrameError> {
    match value {
        Some(bytes) => {
            let len = i32::try_from(bytes.len())
                .map_err(|_| FrameError::LengthOverflow(bytes.len(), 32))?;
            dst.put_i32(len);
            dst.put_slice(bytes);
        }
        None => dst.put_i32(-1),
    }
    Ok(())
}

fn put_string_map(dst: &mut BytesMut, map: &BTreeMap<String, String>) -> Result<(), FrameError> {
    dst.put_u16(short_len(map.len())?);
    for (key, value) in map {
        put_string(dst, key)?;
        put_string(dst, value)?;
    }
    Ok(())
}

fn put_string_multimap(
    dst: &mut BytesMut,
    map: &BTreeMap<String, Vec<String>>,
) -> Result<(), FrameError> {
    dst.put_u16(short_len(map.len())?);
    for (key, values) in map {
        put_string(dst, key)?;
        dst.put_u16(short_len(values.len())?);
        for value in values {
            put_string(dst, value)?;
        }
    }
    Ok(())
}

fn ensure_remaining(src: &Bytes, needed: usize) -> Result<(), FrameError> {
    if src.remaining() < needed {
        Err(FrameError::Truncated)
    } else {
        Ok(())
    }
}

fn ensure_consumed(src: &Bytes) -> Result<(), FrameError> {
    match src.remaining() {
        0 => Ok(()),
        extra => Err(FrameError::TrailingBytes(extra)),
    }
}

fn get_string(src: &mut Bytes) -> Result<String, FrameError> {
    ensure_remaining(src, 2)?;
    let len = src.get_u16() as usize;
    ensure_remaining(src, len)?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

fn get_bytes(src: &mut Bytes) -> Result<Option<Bytes>, FrameError> {
    ensure_remaining(src, 4)?;
    let len = src.get_i32();
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    ensure_remaining(src, len)?;
    Ok(Some(src.split_to(len)))
}

fn get_string_map(src: &mut Bytes) -> Result<BTreeMap<String, String>, FrameError> {
    ensure_remaining(src, 2)?;
    let count = src.get_u16();
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = get_string(src)?;
        let value = get_string(src)?;
        map.insert(key, value);
    }
    Ok(map)
}

fn get_string_multimap(src: &mut Bytes) -> Result<BTreeMap<String, Vec<String>>, FrameError> {
    ensure_remaining(src, 2)?;
    let count = src.get_u16();
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = get_string(src)?;
        ensure_remaining(src, 2)?;
        let len = src.get_u16();
        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            values.push(get_string(src)?);
        }
        map.insert(key, values);
    }
    Ok(map)
}
