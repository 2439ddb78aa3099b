//! Request frame types and the literal reply payloads.
//!
//! Replies carry no status code: both sides agree on these exact strings,
//! so changing one requires changing sender and receiver together.

use std::fmt;

use crate::error::LanboxError;

// ── Reply literals ───────────────────────────────────────────────

/// Handshake reply when the receiver slot is already held.
pub const REPLY_RECEIVER_BUSY: &str = "Receiver is already connected with another device";

/// Handshake reply when the offered name is registered.
pub const REPLY_NAME_TAKEN: &str = "Username already taken";

/// Reply to a completed `Text` frame.
pub const REPLY_TEXT_RECEIVED: &str = "Text Received";

/// Reply to a completed `File` frame.
pub const REPLY_FILE_DOWNLOADED: &str = "File Downloaded";

/// Reply to a `File` frame that could not be materialized.
///
/// The wording predates file transfers; senders match on it verbatim.
pub const REPLY_TRANSFER_FAILED: &str = "Error Receiving Text";

/// Payload carried by every poll frame.
pub const POLL_PAYLOAD: &[u8] = b"POLL";

// ── FrameType ────────────────────────────────────────────────────

/// Kind of a request frame (sender → receiver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Payload is text to surface on the receiver.
    Text,
    /// Payload is file content, preceded by a filename sub-header.
    File,
    /// Payload is read and discarded; never answered.
    Poll,
}

impl FrameType {
    /// The tag written into the 10-byte type field.
    pub fn tag(self) -> &'static str {
        match self {
            FrameType::Text => "Text",
            FrameType::File => "File",
            FrameType::Poll => "Poll",
        }
    }

    /// Parse a tag with its padding already trimmed.
    ///
    /// Accepts `POLL` as well, which older senders emit.
    pub fn from_tag(tag: &str) -> Result<Self, LanboxError> {
        match tag {
            "Text" => Ok(FrameType::Text),
            "File" => Ok(FrameType::File),
            "Poll" | "POLL" => Ok(FrameType::Poll),
            other => Err(LanboxError::protocol(format!("unknown frame type {other:?}"))),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ── HandshakeOutcome ─────────────────────────────────────────────

/// How the receiver answered a proposed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The name was echoed back; the session is active.
    Accepted(String),
    /// Another sender holds the slot; the receiver closes the connection.
    ReceiverBusy,
    /// The name is in use; another name may be offered on the same connection.
    NameTaken,
}

impl HandshakeOutcome {
    /// Classify a handshake reply by exact literal comparison.
    pub fn classify(proposed: &str, reply: &[u8]) -> Result<Self, LanboxError> {
        let reply = std::str::from_utf8(reply)?;
        if reply == REPLY_RECEIVER_BUSY {
            Ok(HandshakeOutcome::ReceiverBusy)
        } else if reply == REPLY_NAME_TAKEN {
            Ok(HandshakeOutcome::NameTaken)
        } else if reply == proposed {
            Ok(HandshakeOutcome::Accepted(reply.to_string()))
        } else {
            Err(LanboxError::protocol(format!(
                "unexpected handshake reply {reply:?}"
            )))
        }
    }
}

// ── Names ────────────────────────────────────────────────────────

/// Maximum length of a registered name.
pub const MAX_NAME_LEN: usize = 20;

/// Check that `name` is 1–20 ASCII alphanumeric characters.
pub fn validate_name(name: &str) -> Result<(), LanboxError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(LanboxError::protocol(format!(
            "name must be 1-{MAX_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(LanboxError::protocol(format!(
            "name {name:?} must be alphanumeric"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_type_tags() {
        for ty in [FrameType::Text, FrameType::File, FrameType::Poll] {
            assert_eq!(FrameType::from_tag(ty.tag()).unwrap(), ty);
        }
        assert_eq!(FrameType::from_tag("POLL").unwrap(), FrameType::Poll);
        assert!(FrameType::from_tag("text").is_err());
        assert!(FrameType::from_tag("").is_err());
    }

    #[test]
    fn classify_handshake_replies() {
        assert_eq!(
            HandshakeOutcome::classify("alice", REPLY_RECEIVER_BUSY.as_bytes()).unwrap(),
            HandshakeOutcome::ReceiverBusy
        );
        assert_eq!(
            HandshakeOutcome::classify("alice", REPLY_NAME_TAKEN.as_bytes()).unwrap(),
            HandshakeOutcome::NameTaken
        );
        assert_eq!(
            HandshakeOutcome::classify("alice", b"alice").unwrap(),
            HandshakeOutcome::Accepted("alice".into())
        );
        assert!(HandshakeOutcome::classify("alice", b"bob").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("a").is_ok());
        assert!(validate_name("Sender01").is_ok());
        assert!(validate_name(&"x".repeat(20)).is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(21)).is_err());
        assert!(validate_name("bad name").is_err());
        assert!(validate_name("héllo").is_err());
    }
}
