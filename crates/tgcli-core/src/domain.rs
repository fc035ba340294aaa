use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Platform message id. Unique per chat and increasing with time.
pub type MessageId = i32;

/// Kind tag of a resolved entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
    Channel,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user, group, or channel as handed out by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    User {
        id: i64,
        first_name: Option<String>,
        last_name: Option<String>,
        username: Option<String>,
        phone: Option<String>,
    },
    Group {
        id: i64,
        title: String,
    },
    Channel {
        id: i64,
        title: String,
    },
}

impl Entity {
    /// Human display name: the title for groups/channels, "first last" for users,
    /// `"Unknown"` when nothing usable is set.
    pub fn display_name(&self) -> String {
        let name = match self {
            Self::User {
                first_name,
                last_name,
                ..
            } => [first_name.as_deref(), last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Group { title, .. } | Self::Channel { title, .. } => title.trim().to_string(),
        };
        if name.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            name
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User { .. } => EntityKind::User,
            Self::Group { .. } => EntityKind::Group,
            Self::Channel { .. } => EntityKind::Channel,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::User { id, .. } | Self::Group { id, .. } | Self::Channel { id, .. } => *id,
        }
    }

    /// Same platform object (kind + id), regardless of cached name fields.
    pub fn same_peer(&self, other: &Entity) -> bool {
        self.kind() == other.kind() && self.id() == other.id()
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::User { phone, .. } => phone.as_deref(),
            _ => None,
        }
    }
}

pub const UNKNOWN_NAME: &str = "Unknown";

/// Display name for an optional entity (missing sender, deleted account, ...).
pub fn name_of(entity: Option<&Entity>) -> String {
    entity
        .map(Entity::display_name)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

/// One conversation as yielded by the transport's dialog stream.
#[derive(Clone, Debug)]
pub struct Dialog {
    pub name: String,
    pub entity: Entity,
    pub unread_count: u32,
    pub pinned: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Raw message as yielded by the transport's message stream.
///
/// `chat` and `sender` are already looked up by the adapter; either may be
/// missing (deleted accounts, anonymous admins, service messages).
#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub date: DateTime<Utc>,
    pub reply_to_id: Option<MessageId>,
    pub chat: Option<Entity>,
    pub sender: Option<Entity>,
}

/// Message record handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub text: String,
    pub chat_name: String,
    pub sender_name: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "reply_to_msg_id")]
    pub reply_to_id: Option<MessageId>,
}

impl MessageRecord {
    pub fn from_message(msg: &Message, chat_name: &str) -> Self {
        Self {
            id: msg.id,
            text: msg.text.clone(),
            chat_name: chat_name.to_string(),
            sender_name: name_of(msg.sender.as_ref()),
            date: msg.date,
            reply_to_id: msg.reply_to_id,
        }
    }
}

/// Chat record handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatSummary {
    pub name: String,
    #[serde(rename = "chat_type")]
    pub kind: EntityKind,
    pub unread_count: u32,
    pub pinned: bool,
    #[serde(rename = "date")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl From<Dialog> for ChatSummary {
    fn from(d: Dialog) -> Self {
        Self {
            kind: d.entity.kind(),
            name: d.name,
            unread_count: d.unread_count,
            pinned: d.pinned,
            last_activity: d.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: Option<&str>, last: Option<&str>) -> Entity {
        Entity::User {
            id: 1,
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            username: None,
            phone: None,
        }
    }

    #[test]
    fn user_display_name_joins_present_parts() {
        assert_eq!(user(Some("Ada"), Some("Lovelace")).display_name(), "Ada Lovelace");
        assert_eq!(user(Some("Ada"), None).display_name(), "Ada");
        assert_eq!(user(None, Some("Lovelace")).display_name(), "Lovelace");
    }

    #[test]
    fn empty_names_fall_back_to_unknown() {
        assert_eq!(user(None, None).display_name(), "Unknown");
        assert_eq!(user(Some(" "), Some("")).display_name(), "Unknown");
        let group = Entity::Group {
            id: 2,
            title: String::new(),
        };
        assert_eq!(group.display_name(), "Unknown");
        assert_eq!(name_of(None), "Unknown");
    }

    #[test]
    fn same_peer_compares_kind_and_id() {
        let a = Entity::Group {
            id: 7,
            title: "A".into(),
        };
        let renamed = Entity::Group {
            id: 7,
            title: "B".into(),
        };
        let channel = Entity::Channel {
            id: 7,
            title: "A".into(),
        };
        assert!(a.same_peer(&renamed));
        assert!(!a.same_peer(&channel));
    }

    #[test]
    fn message_record_serializes_wire_names() {
        let rec = MessageRecord {
            id: 3,
            text: "héllo".into(),
            chat_name: "Chat".into(),
            sender_name: "Ada".into(),
            date: "2025-06-15T12:00:00Z".parse().unwrap(),
            reply_to_id: Some(1),
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["reply_to_msg_id"], 1);
        assert_eq!(v["date"], "2025-06-15T12:00:00Z");
    }
}
