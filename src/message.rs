//! Message protocol definitions
//!
//! Inbound frames are JSON objects whose shape (not a tag) selects the
//! command; outbound traffic always uses the fixed [`Envelope`].

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{GroupId, UserId};

/// Content type tag of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
}

/// Membership mutation requested by a group admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipAction {
    Add,
    Remove,
}

impl MembershipAction {
    /// Past tense used in membership notifications
    pub fn past_tense(self) -> &'static str {
        match self {
            MembershipAction::Add => "added",
            MembershipAction::Remove => "removed",
        }
    }
}

/// Raw inbound frame, matched by field shape in declaration order
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundFrame {
    Private {
        #[serde(rename = "type")]
        kind: MessageKind,
        content: String,
        receiver_id: UserId,
    },
    Group {
        #[serde(rename = "type")]
        kind: MessageKind,
        content: String,
        group_id: GroupId,
    },
    CreateGroup {
        group_name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        members: Vec<String>,
    },
    Membership {
        member_id: UserId,
        action: MembershipAction,
        #[serde(default)]
        group_id: Option<GroupId>,
    },
}

/// Decoded client → server command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a message to one user
    PrivateMessage {
        receiver: UserId,
        kind: MessageKind,
        content: String,
    },
    /// Send a message to every member of a group
    GroupMessage {
        group: GroupId,
        kind: MessageKind,
        content: String,
    },
    /// Create a group with the sender as admin.
    ///
    /// Member ids stay raw so invalid entries can be skipped one by one.
    CreateGroup {
        name: String,
        description: String,
        members: Vec<String>,
    },
    /// Add or remove a group member
    MembershipChange {
        group: GroupId,
        member: UserId,
        action: MembershipAction,
    },
}

/// Per-connection context fixed at upgrade time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Group named in the upgrade path (`/ws/groups/{group_id}`)
    pub group: Option<GroupId>,
}

impl SessionContext {
    pub fn for_group(group: GroupId) -> Self {
        Self { group: Some(group) }
    }
}

/// Decode one inbound frame.
///
/// Never panics; every malformed input maps to
/// [`AppError::InvalidMessageFormat`].
pub fn decode(bytes: &[u8], context: &SessionContext) -> Result<Command, AppError> {
    let frame: InboundFrame = serde_json::from_slice(bytes)
        .map_err(|e| AppError::InvalidMessageFormat(e.to_string()))?;

    let command = match frame {
        InboundFrame::Private {
            kind,
            content,
            receiver_id,
        } => Command::PrivateMessage {
            receiver: receiver_id,
            kind,
            content,
        },
        InboundFrame::Group {
            kind,
            content,
            group_id,
        } => Command::GroupMessage {
            group: group_id,
            kind,
            content,
        },
        InboundFrame::CreateGroup {
            group_name,
            description,
            members,
        } => {
            if group_name.trim().is_empty() {
                return Err(AppError::InvalidMessageFormat(
                    "group_name must not be empty".to_string(),
                ));
            }
            Command::CreateGroup {
                name: group_name,
                description,
                members,
            }
        }
        InboundFrame::Membership {
            member_id,
            action,
            group_id,
        } => {
            let group = group_id.or(context.group).ok_or_else(|| {
                AppError::InvalidMessageFormat(
                    "membership change requires a group id".to_string(),
                )
            })?;
            Command::MembershipChange {
                group,
                member: member_id,
                action,
            }
        }
    };

    Ok(command)
}

/// Server → client envelope
///
/// Every outbound frame has exactly these three fields; `error_msg` is
/// empty on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub status_code: u16,
    pub error_msg: String,
    pub data: String,
}

impl Envelope {
    /// Successful notification carrying `data`
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            error_msg: String::new(),
            data: data.into(),
        }
    }

    /// Error notification with no payload
    pub fn error(status_code: u16, error_msg: impl Into<String>) -> Self {
        Self {
            status_code,
            error_msg: error_msg.into(),
            data: String::new(),
        }
    }

    /// Serialize to the JSON text written on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Convert AppError to an error envelope for client notification
impl From<&AppError> for Envelope {
    fn from(err: &AppError) -> Self {
        let message = match err {
            // Internal details stay in the logs
            AppError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Envelope::error(err.status_code(), message)
    }
}

impl From<AppError> for Envelope {
    fn from(err: AppError) -> Self {
        Envelope::from(&err)
    }
}
