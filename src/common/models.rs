use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Backend identity of a user.
    UserId
);
string_id!(
    /// Backend identifier of a persisted thread.
    ThreadId
);
string_id!(
    /// Server-assigned message identifier.
    MessageId
);
string_id!(
    /// Listing (property or vehicle) a thread may be attached to.
    ListingId
);

/// Client-assigned identifier of a message that has not been persisted yet.
///
/// Time-based (UUID v7), unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientMessageId(Uuid);

impl ClientMessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ClientMessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    #[default]
    Tenant,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Tenant => "tenant",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "tenant" => Ok(Role::Tenant),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

impl Profile {
    /// Name shown in the sidebar: display name, falling back to username.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

/// Denormalized copy of the newest message of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub body: String,
    pub sent_at: i64,
    pub sender_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    /// Participant who started the conversation.
    pub owner_id: UserId,
    pub counterparty_id: UserId,
    pub listing_id: Option<ListingId>,
    pub last_message: Option<LastMessage>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Thread {
    pub fn involves(&self, user: &UserId) -> bool {
        &self.owner_id == user || &self.counterparty_id == user
    }

    /// The participant that is not `me`.
    pub fn other_participant(&self, me: &UserId) -> &UserId {
        if &self.owner_id == me {
            &self.counterparty_id
        } else {
            &self.owner_id
        }
    }

    /// Timestamp used to order threads by recency.
    pub fn activity_at(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|m| m.sent_at)
            .unwrap_or(self.updated_at)
    }
}

/// A thread as seen by one participant, annotated with the other one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread: Thread,
    pub other: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub body: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

/// Result of a successful sign up, sign in or session resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub user: Profile,
    pub token: String,
    pub expires_at: i64,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(last: Option<i64>) -> Thread {
        Thread {
            id: ThreadId::from("t1"),
            owner_id: UserId::from("bob"),
            counterparty_id: UserId::from("alice"),
            listing_id: None,
            last_message: last.map(|sent_at| LastMessage {
                body: "hi".into(),
                sent_at,
                sender_id: UserId::from("bob"),
            }),
            created_at: 10,
            updated_at: 20,
        }
    }

    #[test]
    fn other_participant_is_relative_to_caller() {
        let t = thread(None);
        assert_eq!(t.other_participant(&UserId::from("bob")).as_str(), "alice");
        assert_eq!(t.other_participant(&UserId::from("alice")).as_str(), "bob");
        assert!(t.involves(&UserId::from("alice")));
        assert!(!t.involves(&UserId::from("carol")));
    }

    #[test]
    fn activity_prefers_last_message_time() {
        assert_eq!(thread(None).activity_at(), 20);
        assert_eq!(thread(Some(99)).activity_at(), 99);
    }

    #[test]
    fn client_ids_are_unique() {
        let a = ClientMessageId::new();
        let b = ClientMessageId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("tmp-"));
    }

    #[test]
    fn role_parses_lowercase_names() {
        assert_eq!("owner".parse::<Role>(), Ok(Role::Owner));
        assert_eq!(Role::default(), Role::Tenant);
        assert!("landlord".parse::<Role>().is_err());
    }

    #[test]
    fn profile_label_falls_back_to_username() {
        let mut p = Profile {
            id: UserId::from("u1"),
            email: "a@x.io".into(),
            username: "alice".into(),
            display_name: "  ".into(),
            role: Role::Tenant,
        };
        assert_eq!(p.label(), "alice");
        p.display_name = "Alice A.".into();
        assert_eq!(p.label(), "Alice A.");
    }
}
