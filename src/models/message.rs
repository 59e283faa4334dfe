use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Message importance as chosen by the composer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Normal => "normal",
            Importance::High => "high",
        }
    }

    /// Lenient decode for values already persisted; the column CHECK keeps
    /// these in range, so unknowns only appear on manual edits.
    pub fn from_db(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "low" => Ok(Importance::Low),
            "normal" => Ok(Importance::Normal),
            "high" => Ok(Importance::High),
            other => Err(AppError::validation(
                "importance",
                format!("must be low, normal or high, got {other:?}"),
            )),
        }
    }
}

/// Which party of a message a user is. Every per-party flag (archive,
/// delete) is keyed off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Sender,
    Recipient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: Option<String>,
    pub body: String,
    pub importance: Importance,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub archived_by_sender: bool,
    pub archived_by_recipient: bool,
    pub deleted_by_sender: bool,
    pub deleted_by_recipient: bool,
}

impl Message {
    /// The side `user` occupies on this message, if any. A user who is both
    /// sender and recipient is treated as sender; self-messaging is rejected
    /// at composition, so this only matters for legacy rows.
    pub fn side_of(&self, user: Uuid) -> Option<Side> {
        if self.sender_id == user {
            Some(Side::Sender)
        } else if self.recipient_id == user {
            Some(Side::Recipient)
        } else {
            None
        }
    }

    pub fn deleted_on(&self, side: Side) -> bool {
        match side {
            Side::Sender => self.deleted_by_sender,
            Side::Recipient => self.deleted_by_recipient,
        }
    }

    pub fn archived_on(&self, side: Side) -> bool {
        match side {
            Side::Sender => self.archived_by_sender,
            Side::Recipient => self.archived_by_recipient,
        }
    }

    /// A message exists for a party until that party soft-deletes it.
    /// Archived messages remain visible in detail view (they are only
    /// filtered from the default list views).
    pub fn visible_to(&self, user: Uuid) -> bool {
        match self.side_of(user) {
            Some(side) => !self.deleted_on(side),
            None => false,
        }
    }

    /// The other party relative to `user`.
    pub fn counterpart_of(&self, user: Uuid) -> Option<Uuid> {
        match self.side_of(user)? {
            Side::Sender => Some(self.recipient_id),
            Side::Recipient => Some(self.sender_id),
        }
    }
}

/// Default subject for a reply, mirroring the composer UI convention.
pub fn reply_subject(original: Option<&str>) -> String {
    format!("Re: {}", original.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: Uuid, recipient: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Some(Uuid::new_v4()),
            sender_id: sender,
            recipient_id: recipient,
            subject: Some("Hi".into()),
            body: "Hello".into(),
            importance: Importance::Normal,
            sent_at: Utc::now(),
            is_read: false,
            archived_by_sender: false,
            archived_by_recipient: false,
            deleted_by_sender: false,
            deleted_by_recipient: false,
        }
    }

    #[test]
    fn importance_round_trips_through_text() {
        for v in [Importance::Low, Importance::Normal, Importance::High] {
            assert_eq!(Importance::parse(v.as_str()).unwrap(), v);
        }
        assert!(Importance::parse("urgent").is_err());
    }

    #[test]
    fn side_and_counterpart() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let m = message(a, b);
        assert_eq!(m.side_of(a), Some(Side::Sender));
        assert_eq!(m.side_of(b), Some(Side::Recipient));
        assert_eq!(m.side_of(c), None);
        assert_eq!(m.counterpart_of(a), Some(b));
        assert_eq!(m.counterpart_of(b), Some(a));
        assert_eq!(m.counterpart_of(c), None);
    }

    #[test]
    fn soft_delete_hides_one_side_only() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut m = message(a, b);
        assert!(m.visible_to(a) && m.visible_to(b));
        m.deleted_by_sender = true;
        assert!(!m.visible_to(a));
        assert!(m.visible_to(b));
    }

    #[test]
    fn archive_does_not_hide_detail_view() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut m = message(a, b);
        m.archived_by_recipient = true;
        assert!(m.visible_to(b));
    }

    #[test]
    fn reply_subject_prefixes() {
        assert_eq!(reply_subject(Some("Hi")), "Re: Hi");
        assert_eq!(reply_subject(None), "Re: ");
    }
}
