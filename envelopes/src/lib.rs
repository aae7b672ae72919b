//! Shared envelope model and JSON codec for the realtime channel transport.
//!
//! This crate owns the wire representation exchanged over both connection
//! scopes. An [`Envelope`] carries routing metadata plus a [`Content`] whose
//! shape is chosen by the closed `type` discriminator, so an envelope whose
//! `type` and `content` disagree cannot be constructed.
//!
//! WIRE FORMAT
//! ===========
//! `{ "type", "channelName", "username", "timestamp", "content" }` as JSON
//! text. Keys are converted between the local snake_case and the wire
//! camelCase by [`case`] on every encode and decode. Object key order is
//! kept through the intermediate `Value`, so sketch regions replay in the
//! order they were received.
//!
//! VALIDATION
//! ==========
//! Decoding is parse, key conversion, typed deserialization, then
//! [`Envelope::validate`] for rules serde cannot express (an `Update` must
//! carry a region, paths need points and a positive stroke width, ...).

pub mod case;
pub mod sketch;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use sketch::{CommandType, Path, Point, Region, Sketch, SketchCommand};

/// Error returned by [`decode_envelope`] and [`encode_envelope`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not JSON, or does not match the envelope shape.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload parsed but breaks a content rule.
    #[error("invalid envelope: {0}")]
    Schema(#[from] SchemaError),
}

/// Content rules checked after deserialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("sketch id is empty")]
    MissingSketchId,
    #[error("update command requires a region")]
    MissingRegion,
    #[error("{0:?} command must not carry a region")]
    UnexpectedRegion(CommandType),
    #[error("region bounds are inverted")]
    InvertedRegion,
    #[error("region carries no paths")]
    EmptyRegion,
    #[error("path has no points")]
    EmptyPath,
    #[error("path stroke width must be positive")]
    ZeroStrokeWidth,
    #[error("new command requires sketch data")]
    MissingSketchData,
    #[error("sketch data id `{found}` does not match command id `{expected}`")]
    SketchIdMismatch { expected: String, found: String },
}

/// The closed set of envelope discriminators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    MemberUpdate,
    UserStatus,
    ChannelUpdate,
    SystemUserStatus,
    Sketch,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Text,
        Self::Image,
        Self::MemberUpdate,
        Self::UserStatus,
        Self::ChannelUpdate,
        Self::SystemUserStatus,
        Self::Sketch,
    ];

    /// The `type` string used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::MemberUpdate => "MEMBER_UPDATE",
            Self::UserStatus => "USER_STATUS",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::SystemUserStatus => "SYSTEM_USER_STATUS",
            Self::Sketch => "SKETCH",
        }
    }

    /// Chat payloads (`TEXT`, `IMAGE`).
    #[must_use]
    pub fn is_chat(self) -> bool {
        matches!(self, Self::Text | Self::Image)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership change broadcast inside a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub username: String,
    pub action: MemberAction,
    pub is_admin: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberAction {
    Added,
    RoleChanged,
}

/// A channel member went online or offline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub username: String,
    pub action: Presence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// Channel lifecycle broadcast. Server-originated only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub action: ChannelAction,
    pub channel: ChannelInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelAction {
    Created,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Global online-user count on the system scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUserStatus {
    pub count: u32,
}

/// Envelope payload, tagged by the wire `type` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Content {
    /// Chat text body.
    Text(String),
    /// Uploaded image URL.
    Image(String),
    MemberUpdate(MemberUpdate),
    UserStatus(UserStatus),
    ChannelUpdate(ChannelUpdate),
    SystemUserStatus(SystemUserStatus),
    Sketch(SketchCommand),
}

impl Content {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::Image(_) => MessageKind::Image,
            Self::MemberUpdate(_) => MessageKind::MemberUpdate,
            Self::UserStatus(_) => MessageKind::UserStatus,
            Self::ChannelUpdate(_) => MessageKind::ChannelUpdate,
            Self::SystemUserStatus(_) => MessageKind::SystemUserStatus,
            Self::Sketch(_) => MessageKind::Sketch,
        }
    }
}

/// A single message on the realtime wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel the message belongs to; empty on the system scope.
    #[serde(default)]
    pub channel_name: String,
    /// Originating user.
    #[serde(default)]
    pub username: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub content: Content,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    #[must_use]
    pub fn new(channel_name: impl Into<String>, username: impl Into<String>, content: Content) -> Self {
        Self { channel_name: channel_name.into(), username: username.into(), timestamp: now_ms(), content }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }

    /// Check content rules beyond the typed shape.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found in a sketch payload.
    pub fn validate(&self) -> Result<(), SchemaError> {
        match &self.content {
            Content::Sketch(command) => command.validate(),
            _ => Ok(()),
        }
    }
}

/// Encode an envelope as wire JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    let wire = to_wire_json(envelope)?;
    Ok(serde_json::to_string(&wire)?)
}

/// Decode and validate wire JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for text that is not a well-formed envelope
/// and [`CodecError::Schema`] for envelopes that break a content rule.
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    let wire: Value = serde_json::from_str(text)?;
    let envelope: Envelope = from_wire_json(wire)?;
    envelope.validate()?;
    Ok(envelope)
}

/// Serialize any local value into a wire-convention JSON value.
///
/// # Errors
///
/// Returns the serializer error.
pub fn to_wire_json<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    Ok(case::to_wire(serde_json::to_value(value)?))
}

/// Deserialize a wire-convention JSON value into a local type.
///
/// # Errors
///
/// Returns the deserializer error.
pub fn from_wire_json<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(case::to_local(value))
}

/// Milliseconds since the Unix epoch, saturating.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
