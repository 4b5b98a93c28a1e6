//! Persistence seam used by the route handlers.

use anyhow::Result;
use async_trait::async_trait;

use crate::database::models::{
    Admin, Conversation, ConversationStatus, Message, NewAdmin, NewStudent, Student, StudentLink,
    User, UserSummary,
};

/// Every query the gateway runs against the relational store.
///
/// Mutations on a missing row return `None`/`false` rather than an error so
/// handlers can answer 404.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<UserSummary>>;
    async fn find_student(&self, id: i32) -> Result<Option<Student>>;
    async fn find_admin(&self, id: i32) -> Result<Option<Admin>>;

    async fn username_taken(&self, username: &str) -> Result<bool>;
    async fn jmbag_taken(&self, jmbag: &str) -> Result<bool>;
    async fn count_admins(&self) -> Result<i64>;

    async fn insert_student(&self, student: NewStudent) -> Result<Student>;
    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin>;
    /// Insert `admin` only while no admin exists; `None` when another
    /// registration got there first
    async fn insert_first_admin(&self, admin: NewAdmin) -> Result<Option<Admin>>;

    async fn update_password(&self, user_id: i32, password_hash: &str) -> Result<bool>;
    async fn update_avatar(&self, user_id: i32, avatar: &str) -> Result<Option<User>>;
    async fn set_process_instance(
        &self,
        student_id: i32,
        process_instance_id: Option<&str>,
    ) -> Result<Option<Student>>;

    /// (id, baserow_id, process_instance_id) of every student
    async fn student_links(&self) -> Result<Vec<StudentLink>>;
    /// Delete a student row inside a transaction; false when it no longer exists
    async fn delete_student(&self, id: i32) -> Result<bool>;

    /// Insert a message and fold it into the pair's conversation atomically
    async fn send_message(
        &self,
        sender_id: i32,
        receiver_id: i32,
        content: &str,
    ) -> Result<(Message, Conversation)>;
    async fn messages_between(&self, user_a: i32, user_b: i32) -> Result<Vec<Message>>;

    /// Conversations the user takes part in and has not archived, newest first
    async fn conversations_for(&self, user_id: i32) -> Result<Vec<Conversation>>;
    /// Find or create the pair's conversation and make it active for `user_id`
    async fn open_conversation(&self, user_id: i32, participant_id: i32) -> Result<Conversation>;
    async fn find_conversation(&self, id: i32) -> Result<Option<Conversation>>;
    async fn mark_conversation_read(&self, id: i32, user_id: i32) -> Result<Option<Conversation>>;
    async fn set_conversation_active(
        &self,
        id: i32,
        user_id: i32,
        active: bool,
    ) -> Result<Option<Conversation>>;
    async fn set_conversation_status(
        &self,
        id: i32,
        status: ConversationStatus,
    ) -> Result<Option<Conversation>>;
}
