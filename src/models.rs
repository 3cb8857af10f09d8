use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Records older than this are never served and are eventually removed.
pub const RETENTION_DAYS: i64 = 30;

/// Upper bound on a single List call.
pub const LIST_LIMIT: usize = 50;

pub fn retention() -> Duration {
    Duration::days(RETENTION_DAYS)
}

/// Oldest timestamp still considered live at `now`.
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - retention()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Accountant,
    Receptionist,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Teacher,
        Role::Accountant,
        Role::Receptionist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Accountant => "Accountant",
            Role::Receptionist => "Receptionist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Success,
    Error,
    #[default]
    Info,
    Warning,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Success => "success",
            NotificationType::Error => "error",
            NotificationType::Info => "info",
            NotificationType::Warning => "warning",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(NotificationType::Success),
            "error" => Ok(NotificationType::Error),
            "info" => Ok(NotificationType::Info),
            "warning" => Ok(NotificationType::Warning),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Student,
    Teacher,
    Class,
    Fee,
    Visitor,
    Admission,
    Complain,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Student => "student",
            EntityType::Teacher => "teacher",
            EntityType::Class => "class",
            EntityType::Fee => "fee",
            EntityType::Visitor => "visitor",
            EntityType::Admission => "admission",
            EntityType::Complain => "complain",
            EntityType::Other => "other",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(EntityType::Student),
            "teacher" => Ok(EntityType::Teacher),
            "class" => Ok(EntityType::Class),
            "fee" => Ok(EntityType::Fee),
            "visitor" => Ok(EntityType::Visitor),
            "admission" => Ok(EntityType::Admission),
            "complain" => Ok(EntityType::Complain),
            "other" => Ok(EntityType::Other),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntity {
    pub entity_type: EntityType,
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity: Option<RelatedEntity>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Fresh unread record stamped with `timestamp`.
    pub fn new(
        user_id: String,
        message: String,
        kind: NotificationType,
        related_entity: Option<RelatedEntity>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            message,
            kind,
            read: false,
            related_entity,
            timestamp,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.timestamp <= retention_cutoff(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_ignores_case_and_padding() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" SuperAdmin ".parse::<Role>(), Ok(Role::SuperAdmin));
        assert!("Janitor".parse::<Role>().is_err());
    }

    #[test]
    fn notification_serializes_with_wire_names() {
        let n = Notification::new(
            "u1".into(),
            "Fee due".into(),
            NotificationType::Warning,
            Some(RelatedEntity { entity_type: EntityType::Fee, entity_id: "f9".into() }),
            Utc::now(),
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["type"], "warning");
        assert_eq!(json["read"], false);
        assert_eq!(json["relatedEntity"]["entityType"], "fee");
    }

    #[test]
    fn expiry_boundary_is_thirty_days() {
        let now = Utc::now();
        let mut n = Notification::new("u".into(), "m".into(), NotificationType::Info, None, now);
        assert!(!n.is_expired(now));
        n.timestamp = now - Duration::days(29);
        assert!(!n.is_expired(now));
        n.timestamp = now - Duration::days(31);
        assert!(n.is_expired(now));
    }
}
