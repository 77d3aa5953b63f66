//! Subchannel frames carried over the broker channel.
//!
//! Wire layout is a sequence of length-prefixed UTF-8 strings: a 16-bit
//! big-endian byte length followed by exactly that many bytes. The first
//! string is the subchannel tag; what follows depends on the tag. The
//! correlation subchannel carries one more string holding the JSON-encoded
//! [`Message`]; the housekeeping subchannels carry short string sequences.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::message::Message;

pub const TAG_ENVELOPE: &str = "msg";
pub const TAG_LIST_ACTORS: &str = "actors?";
pub const TAG_ACTOR_LIST: &str = "actors";
pub const TAG_LIST_SERVERS: &str = "servers?";
pub const TAG_SERVER_LIST: &str = "servers";
pub const TAG_WHO_AM_I: &str = "whoami?";
pub const TAG_LOCAL_SERVER: &str = "whoami";
pub const TAG_TRANSFER: &str = "transfer";

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Truncated frame: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("Frame string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Envelope body error: {0}")]
    Body(#[from] serde_json::Error),

    #[error("Unknown subchannel tag: {0}")]
    UnknownTag(String),

    #[error("String of {len} bytes exceeds the 16-bit length prefix")]
    TooLong { len: usize },
}

/// One frame on the cluster channel.
///
/// Request and response housekeeping tags are distinct so a node hearing its
/// own publications (pub/sub transports deliver to the publisher too) never
/// answers itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A correlation envelope, request or reply.
    Envelope(Message),
    /// Ask every node for its locally-online actor names.
    ListActors,
    /// A node's answer to [`Frame::ListActors`].
    ActorList { names: Vec<String> },
    /// Ask every node for its server name.
    ListServers,
    /// A node's answer to [`Frame::ListServers`].
    ServerList { names: Vec<String> },
    /// Ask the transport what this node is called.
    WhoAmI,
    /// The transport's answer to [`Frame::WhoAmI`].
    LocalServer { name: String },
    /// Ask the node hosting `actor` to hand them to `server`.
    Transfer { actor: String, server: String },
}

impl Frame {
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        match self {
            Frame::Envelope(message) => {
                put_str(&mut buf, TAG_ENVELOPE)?;
                put_str(&mut buf, &serde_json::to_string(message)?)?;
            }
            Frame::ListActors => put_str(&mut buf, TAG_LIST_ACTORS)?,
            Frame::ActorList { names } => {
                put_str(&mut buf, TAG_ACTOR_LIST)?;
                put_str(&mut buf, &names.join(","))?;
            }
            Frame::ListServers => put_str(&mut buf, TAG_LIST_SERVERS)?,
            Frame::ServerList { names } => {
                put_str(&mut buf, TAG_SERVER_LIST)?;
                put_str(&mut buf, &names.join(","))?;
            }
            Frame::WhoAmI => put_str(&mut buf, TAG_WHO_AM_I)?,
            Frame::LocalServer { name } => {
                put_str(&mut buf, TAG_LOCAL_SERVER)?;
                put_str(&mut buf, name)?;
            }
            Frame::Transfer { actor, server } => {
                put_str(&mut buf, TAG_TRANSFER)?;
                put_str(&mut buf, actor)?;
                put_str(&mut buf, server)?;
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut buf = bytes;
        let tag = get_str(&mut buf)?;
        match tag.as_str() {
            TAG_ENVELOPE => {
                let body = get_str(&mut buf)?;
                Ok(Frame::Envelope(serde_json::from_str(&body)?))
            }
            TAG_LIST_ACTORS => Ok(Frame::ListActors),
            TAG_ACTOR_LIST => Ok(Frame::ActorList {
                names: split_names(&get_str(&mut buf)?),
            }),
            TAG_LIST_SERVERS => Ok(Frame::ListServers),
            TAG_SERVER_LIST => Ok(Frame::ServerList {
                names: split_names(&get_str(&mut buf)?),
            }),
            TAG_WHO_AM_I => Ok(Frame::WhoAmI),
            TAG_LOCAL_SERVER => Ok(Frame::LocalServer {
                name: get_str(&mut buf)?,
            }),
            TAG_TRANSFER => Ok(Frame::Transfer {
                actor: get_str(&mut buf)?,
                server: get_str(&mut buf)?,
            }),
            _ => Err(CodecError::UnknownTag(tag)),
        }
    }
}

fn put_str(buf: &mut BytesMut, s: &str) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(CodecError::TooLong { len: bytes.len() });
    }
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
    Ok(())
}

fn get_str(buf: &mut &[u8]) -> Result<String, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::Truncated {
            needed: 2 - buf.remaining(),
        });
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Truncated {
            needed: len - buf.remaining(),
        });
    }
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(String::from_utf8(bytes)?)
}

fn split_names(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(',').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, Payload};

    #[test]
    fn strings_are_u16_big_endian_prefixed() {
        let encoded = Frame::WhoAmI.encode().unwrap();
        assert_eq!(&encoded[..2], &[0x00, 0x07]);
        assert_eq!(&encoded[2..], b"whoami?");
    }

    #[test]
    fn envelope_round_trips() {
        let msg = Message::request(
            MessageKind::PositionRequest,
            "Steve",
            "Alex",
            "main",
            Payload::Empty,
        );
        let frame = Frame::Envelope(msg);
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn housekeeping_frames_round_trip() {
        let frames = [
            Frame::ListActors,
            Frame::ActorList {
                names: vec!["Steve".into(), "Alex".into()],
            },
            Frame::ListServers,
            Frame::ServerList {
                names: vec!["alpha".into()],
            },
            Frame::WhoAmI,
            Frame::LocalServer {
                name: "alpha".into(),
            },
            Frame::Transfer {
                actor: "Steve".into(),
                server: "beta".into(),
            },
        ];
        for frame in frames {
            let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn empty_name_list_decodes_empty() {
        let frame = Frame::ActorList { names: Vec::new() };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let encoded = Frame::Transfer {
            actor: "Steve".into(),
            server: "beta".into(),
        }
        .encode()
        .unwrap();
        let err = Frame::decode(&encoded[..encoded.len() - 3]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut buf = BytesMut::new();
        put_str(&mut buf, "bogus").unwrap();
        let err = Frame::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag(tag) if tag == "bogus"));
    }
}
