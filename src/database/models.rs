// Database Models
//
// Tokio-postgres compatible models for the gateway's entities. Users live in a
// single `users` table; `account_type` tells admins and students apart.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Type};

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>
    where
        Self: Sized;
}

// ============================================================================
// USER HIERARCHY
// ============================================================================

/// Discriminator of the user hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Admin,
    Student,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Admin => "admin",
            AccountType::Student => "student",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AccountType::Admin),
            "student" => Ok(AccountType::Student),
            other => Err(format!("unknown account type {other:?}")),
        }
    }
}

impl<'a> FromSql<'a> for AccountType {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let value = <&str as FromSql>::from_sql(ty, raw)?;
        value.parse().map_err(Into::into)
    }

    fn accepts(ty: &Type) -> bool {
        <&str as FromSql>::accepts(ty)
    }
}

/// Base identity shared by admins and students
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar: Option<String>,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            surname: row.try_get("surname")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            avatar: row.try_get("avatar")?,
            account_type: row.try_get("account_type")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Admin {
    #[serde(flatten)]
    pub user: User,
    pub username: String,
}

impl FromRow for Admin {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            user: User::from_row(row)?,
            username: row.try_get("username")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    #[serde(flatten)]
    pub user: User,
    /// National student identifier
    pub jmbag: String,
    pub year_of_study: String,
    /// Row id in the record store
    pub baserow_id: i32,
    /// Workflow-engine process instance, once onboarding has started
    pub process_instance_id: Option<String>,
}

impl FromRow for Student {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            user: User::from_row(row)?,
            jmbag: row.try_get("jmbag")?,
            year_of_study: row.try_get("year_of_study")?,
            baserow_id: row.try_get("baserow_id")?,
            process_instance_id: row.try_get("process_instance_id")?,
        })
    }
}

/// Public directory entry
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
    pub surname: String,
    pub avatar: Option<String>,
    pub account_type: AccountType,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            surname: user.surname.clone(),
            avatar: user.avatar.clone(),
            account_type: user.account_type,
        }
    }
}

impl FromRow for UserSummary {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            surname: row.try_get("surname")?,
            avatar: row.try_get("avatar")?,
            account_type: row.try_get("account_type")?,
        })
    }
}

/// Local projection of a student used to enrich record-store rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentLink {
    pub id: i32,
    pub baserow_id: i32,
    pub process_instance_id: Option<String>,
}

impl FromRow for StudentLink {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            baserow_id: row.try_get("baserow_id")?,
            process_instance_id: row.try_get("process_instance_id")?,
        })
    }
}

/// Insert payload for a new student
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub jmbag: String,
    pub year_of_study: String,
    pub baserow_id: i32,
}

/// Insert payload for a new admin
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub username: String,
}

// ============================================================================
// MESSAGING
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i32,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl FromRow for Message {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            content: row.try_get("content")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::Closed => "closed",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ConversationStatus::Open),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(format!("unknown conversation status {other:?}")),
        }
    }
}

impl<'a> FromSql<'a> for ConversationStatus {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let value = <&str as FromSql>::from_sql(ty, raw)?;
        value.parse().map_err(Into::into)
    }

    fn accepts(ty: &Type) -> bool {
        <&str as FromSql>::accepts(ty)
    }
}

/// Which side of a conversation a user sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    One,
    Two,
}

/// Direct conversation between two users.
///
/// The pair is stored in canonical order (`user_one_id < user_two_id`), so a
/// pair of users has at most one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i32,
    pub user_one_id: i32,
    pub user_two_id: i32,
    pub user_one_last_read_id: Option<i32>,
    pub user_two_last_read_id: Option<i32>,
    pub user_one_active: bool,
    pub user_two_active: bool,
    pub status: ConversationStatus,
    pub timestamp: DateTime<Utc>,
}

impl FromRow for Conversation {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_one_id: row.try_get("user_one_id")?,
            user_two_id: row.try_get("user_two_id")?,
            user_one_last_read_id: row.try_get("user_one_last_read_id")?,
            user_two_last_read_id: row.try_get("user_two_last_read_id")?,
            user_one_active: row.try_get("user_one_active")?,
            user_two_active: row.try_get("user_two_active")?,
            status: row.try_get("status")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl Conversation {
    /// Order a pair of user ids the way conversations store them.
    pub fn canonical_pair(a: i32, b: i32) -> (i32, i32) {
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn participant(&self, user_id: i32) -> Option<Participant> {
        if user_id == self.user_one_id {
            Some(Participant::One)
        } else if user_id == self.user_two_id {
            Some(Participant::Two)
        } else {
            None
        }
    }

    pub fn involves(&self, user_id: i32) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn is_active_for(&self, user_id: i32) -> bool {
        match self.participant(user_id) {
            Some(Participant::One) => self.user_one_active,
            Some(Participant::Two) => self.user_two_active,
            None => false,
        }
    }

    /// Advance `user_id`'s read-marker. Returns false for non-participants.
    pub fn mark_read(&mut self, user_id: i32, message_id: Option<i32>) -> bool {
        match self.participant(user_id) {
            Some(Participant::One) => self.user_one_last_read_id = message_id,
            Some(Participant::Two) => self.user_two_last_read_id = message_id,
            None => return false,
        }
        true
    }

    pub fn set_active(&mut self, user_id: i32, active: bool) -> bool {
        match self.participant(user_id) {
            Some(Participant::One) => self.user_one_active = active,
            Some(Participant::Two) => self.user_two_active = active,
            None => return false,
        }
        true
    }

    /// Apply a newly sent message: the sender has read it, the receiver has
    /// not, and the conversation becomes visible to both sides again.
    pub fn record_sent(&mut self, message: &Message) -> bool {
        if !self.mark_read(message.sender_id, Some(message.id)) {
            return false;
        }
        self.user_one_active = true;
        self.user_two_active = true;
        self.timestamp = message.timestamp;
        true
    }
}
