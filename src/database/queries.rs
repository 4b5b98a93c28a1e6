//! PostgreSQL implementation of [`Repository`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::Transaction;
use tokio_postgres::types::ToSql;

use crate::database::connection::DatabaseConnection;
use crate::database::models::{
    Admin, Conversation, ConversationStatus, FromRow, Message, NewAdmin, NewStudent, Student,
    StudentLink, User, UserSummary,
};
use crate::database::repository::Repository;

const INSERT_ADMIN: &str =
    "INSERT INTO users (name, surname, email, password_hash, account_type, username)
     VALUES ($1, $2, $3, $4, 'admin', $5)
     RETURNING *";

/// Advisory lock key held while the first admin is created
const ADMIN_BOOTSTRAP_LOCK: i64 = 0x4144_4d49_4e;

fn admin_params(admin: &NewAdmin) -> [&(dyn ToSql + Sync); 5] {
    [
        &admin.name,
        &admin.surname,
        &admin.email,
        &admin.password_hash,
        &admin.username,
    ]
}

const CONVERSATION_BY_PAIR_FOR_UPDATE: &str =
    "SELECT * FROM conversations WHERE user_one_id = $1 AND user_two_id = $2 FOR UPDATE";

/// Find the pair's conversation, creating it if needed, and lock the row.
async fn lock_conversation_for_pair(
    tx: &Transaction<'_>,
    user_a: i32,
    user_b: i32,
) -> Result<Conversation> {
    let (one, two) = Conversation::canonical_pair(user_a, user_b);
    tx.execute(
        "INSERT INTO conversations (user_one_id, user_two_id) VALUES ($1, $2)
         ON CONFLICT (user_one_id, user_two_id) DO NOTHING",
        &[&one, &two],
    )
    .await
    .context("Failed to create conversation")?;

    let row = tx
        .query_one(CONVERSATION_BY_PAIR_FOR_UPDATE, &[&one, &two])
        .await
        .context("Failed to lock conversation")?;
    Ok(Conversation::from_row(&row)?)
}

async fn lock_conversation(tx: &Transaction<'_>, id: i32) -> Result<Option<Conversation>> {
    let row = tx
        .query_opt("SELECT * FROM conversations WHERE id = $1 FOR UPDATE", &[&id])
        .await
        .context("Failed to lock conversation")?;
    Ok(row.map(|r| Conversation::from_row(&r)).transpose()?)
}

/// Write back every mutable column of a conversation.
async fn store_conversation(tx: &Transaction<'_>, conversation: &Conversation) -> Result<Conversation> {
    let row = tx
        .query_one(
            "UPDATE conversations SET
                user_one_last_read_id = $2,
                user_two_last_read_id = $3,
                user_one_active = $4,
                user_two_active = $5,
                status = $6,
                timestamp = $7
             WHERE id = $1
             RETURNING *",
            &[
                &conversation.id,
                &conversation.user_one_last_read_id,
                &conversation.user_two_last_read_id,
                &conversation.user_one_active,
                &conversation.user_two_active,
                &conversation.status.as_str(),
                &conversation.timestamp,
            ],
        )
        .await
        .context("Failed to update conversation")?;
    Ok(Conversation::from_row(&row)?)
}

#[async_trait]
impl Repository for DatabaseConnection {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt("SELECT * FROM users WHERE email = $1", &[&email])
            .await
            .context("Failed to query user by email")?;
        Ok(row.map(|r| User::from_row(&r)).transpose()?)
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt("SELECT * FROM users WHERE id = $1", &[&id])
            .await
            .context("Failed to query user by id")?;
        Ok(row.map(|r| User::from_row(&r)).transpose()?)
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let rows = client
            .query(
                "SELECT id, name, surname, avatar, account_type FROM users ORDER BY surname, name",
                &[],
            )
            .await
            .context("Failed to list users")?;
        Ok(rows.iter().map(UserSummary::from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_student(&self, id: i32) -> Result<Option<Student>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt(
                "SELECT * FROM users WHERE id = $1 AND account_type = 'student'",
                &[&id],
            )
            .await
            .context("Failed to query student")?;
        Ok(row.map(|r| Student::from_row(&r)).transpose()?)
    }

    async fn find_admin(&self, id: i32) -> Result<Option<Admin>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt(
                "SELECT * FROM users WHERE id = $1 AND account_type = 'admin'",
                &[&id],
            )
            .await
            .context("Failed to query admin")?;
        Ok(row.map(|r| Admin::from_row(&r)).transpose()?)
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
                &[&username],
            )
            .await
            .context("Failed to check username")?;
        Ok(row.try_get(0)?)
    }

    async fn jmbag_taken(&self, jmbag: &str) -> Result<bool> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_one("SELECT EXISTS (SELECT 1 FROM users WHERE jmbag = $1)", &[&jmbag])
            .await
            .context("Failed to check jmbag")?;
        Ok(row.try_get(0)?)
    }

    async fn count_admins(&self) -> Result<i64> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_one("SELECT COUNT(*) FROM users WHERE account_type = 'admin'", &[])
            .await
            .context("Failed to count admins")?;
        Ok(row.try_get(0)?)
    }

    async fn insert_student(&self, student: NewStudent) -> Result<Student> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_one(
                "INSERT INTO users
                    (name, surname, email, password_hash, account_type, jmbag, year_of_study, baserow_id)
                 VALUES ($1, $2, $3, $4, 'student', $5, $6, $7)
                 RETURNING *",
                &[
                    &student.name,
                    &student.surname,
                    &student.email,
                    &student.password_hash,
                    &student.jmbag,
                    &student.year_of_study,
                    &student.baserow_id,
                ],
            )
            .await
            .context("Failed to insert student")?;
        Ok(Student::from_row(&row)?)
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_one(INSERT_ADMIN, &admin_params(&admin))
            .await
            .context("Failed to insert admin")?;
        Ok(Admin::from_row(&row)?)
    }

    async fn insert_first_admin(&self, admin: NewAdmin) -> Result<Option<Admin>> {
        let mut client = self.pool.get().await.context("Failed to get DB connection")?;
        let tx = client.transaction().await.context("Failed to start transaction")?;

        // Serializes concurrent bootstrap registrations until commit
        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&ADMIN_BOOTSTRAP_LOCK])
            .await
            .context("Failed to take admin bootstrap lock")?;

        let row = tx
            .query_one("SELECT COUNT(*) FROM users WHERE account_type = 'admin'", &[])
            .await
            .context("Failed to count admins")?;
        let admins: i64 = row.try_get(0)?;
        if admins > 0 {
            return Ok(None);
        }

        let row = tx
            .query_one(INSERT_ADMIN, &admin_params(&admin))
            .await
            .context("Failed to insert admin")?;
        let admin = Admin::from_row(&row)?;
        tx.commit().await.context("Failed to commit admin bootstrap")?;
        Ok(Some(admin))
    }

    async fn update_password(&self, user_id: i32, password_hash: &str) -> Result<bool> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let n = client
            .execute(
                "UPDATE users SET password_hash = $1 WHERE id = $2",
                &[&password_hash, &user_id],
            )
            .await
            .context("Failed to update password")?;
        Ok(n > 0)
    }

    async fn update_avatar(&self, user_id: i32, avatar: &str) -> Result<Option<User>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt(
                "UPDATE users SET avatar = $1 WHERE id = $2 RETURNING *",
                &[&avatar, &user_id],
            )
            .await
            .context("Failed to update avatar")?;
        Ok(row.map(|r| User::from_row(&r)).transpose()?)
    }

    async fn set_process_instance(
        &self,
        student_id: i32,
        process_instance_id: Option<&str>,
    ) -> Result<Option<Student>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt(
                "UPDATE users SET process_instance_id = $1
                 WHERE id = $2 AND account_type = 'student'
                 RETURNING *",
                &[&process_instance_id, &student_id],
            )
            .await
            .context("Failed to update process instance")?;
        Ok(row.map(|r| Student::from_row(&r)).transpose()?)
    }

    async fn student_links(&self) -> Result<Vec<StudentLink>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let rows = client
            .query(
                "SELECT id, baserow_id, process_instance_id FROM users WHERE account_type = 'student'",
                &[],
            )
            .await
            .context("Failed to query student links")?;
        Ok(rows.iter().map(StudentLink::from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn delete_student(&self, id: i32) -> Result<bool> {
        let mut client = self.pool.get().await.context("Failed to get DB connection")?;
        let tx = client.transaction().await.context("Failed to start transaction")?;

        let existing = tx
            .query_opt(
                "SELECT id FROM users WHERE id = $1 AND account_type = 'student' FOR UPDATE",
                &[&id],
            )
            .await
            .context("Failed to lock student")?;
        if existing.is_none() {
            return Ok(false);
        }

        tx.execute("DELETE FROM users WHERE id = $1", &[&id])
            .await
            .context("Failed to delete student")?;
        tx.commit().await.context("Failed to commit student deletion")?;
        Ok(true)
    }

    async fn send_message(
        &self,
        sender_id: i32,
        receiver_id: i32,
        content: &str,
    ) -> Result<(Message, Conversation)> {
        let mut client = self.pool.get().await.context("Failed to get DB connection")?;
        let tx = client.transaction().await.context("Failed to start transaction")?;

        let row = tx
            .query_one(
                "INSERT INTO messages (sender_id, receiver_id, content) VALUES ($1, $2, $3) RETURNING *",
                &[&sender_id, &receiver_id, &content],
            )
            .await
            .context("Failed to insert message")?;
        let message = Message::from_row(&row)?;

        let mut conversation = lock_conversation_for_pair(&tx, sender_id, receiver_id).await?;
        conversation.record_sent(&message);
        let conversation = store_conversation(&tx, &conversation).await?;

        tx.commit().await.context("Failed to commit message")?;
        Ok((message, conversation))
    }

    async fn messages_between(&self, user_a: i32, user_b: i32) -> Result<Vec<Message>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let rows = client
            .query(
                "SELECT * FROM messages
                 WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)
                 ORDER BY timestamp, id",
                &[&user_a, &user_b],
            )
            .await
            .context("Failed to query messages")?;
        Ok(rows.iter().map(Message::from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn conversations_for(&self, user_id: i32) -> Result<Vec<Conversation>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let rows = client
            .query(
                "SELECT * FROM conversations
                 WHERE (user_one_id = $1 AND user_one_active) OR (user_two_id = $1 AND user_two_active)
                 ORDER BY timestamp DESC, id DESC",
                &[&user_id],
            )
            .await
            .context("Failed to query conversations")?;
        Ok(rows.iter().map(Conversation::from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn open_conversation(&self, user_id: i32, participant_id: i32) -> Result<Conversation> {
        let mut client = self.pool.get().await.context("Failed to get DB connection")?;
        let tx = client.transaction().await.context("Failed to start transaction")?;

        let mut conversation = lock_conversation_for_pair(&tx, user_id, participant_id).await?;
        let conversation = if conversation.is_active_for(user_id) {
            conversation
        } else {
            conversation.set_active(user_id, true);
            store_conversation(&tx, &conversation).await?
        };

        tx.commit().await.context("Failed to commit conversation")?;
        Ok(conversation)
    }

    async fn find_conversation(&self, id: i32) -> Result<Option<Conversation>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt("SELECT * FROM conversations WHERE id = $1", &[&id])
            .await
            .context("Failed to query conversation")?;
        Ok(row.map(|r| Conversation::from_row(&r)).transpose()?)
    }

    async fn mark_conversation_read(&self, id: i32, user_id: i32) -> Result<Option<Conversation>> {
        let mut client = self.pool.get().await.context("Failed to get DB connection")?;
        let tx = client.transaction().await.context("Failed to start transaction")?;

        let Some(mut conversation) = lock_conversation(&tx, id).await? else {
            return Ok(None);
        };
        let latest = tx
            .query_opt(
                "SELECT id FROM messages
                 WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                &[&conversation.user_one_id, &conversation.user_two_id],
            )
            .await
            .context("Failed to query latest message")?
            .map(|row| row.try_get::<_, i32>("id"))
            .transpose()?;

        if !conversation.mark_read(user_id, latest) {
            return Ok(None);
        }
        let conversation = store_conversation(&tx, &conversation).await?;
        tx.commit().await.context("Failed to commit read marker")?;
        Ok(Some(conversation))
    }

    async fn set_conversation_active(
        &self,
        id: i32,
        user_id: i32,
        active: bool,
    ) -> Result<Option<Conversation>> {
        let mut client = self.pool.get().await.context("Failed to get DB connection")?;
        let tx = client.transaction().await.context("Failed to start transaction")?;

        let Some(mut conversation) = lock_conversation(&tx, id).await? else {
            return Ok(None);
        };
        if !conversation.set_active(user_id, active) {
            return Ok(None);
        }
        let conversation = store_conversation(&tx, &conversation).await?;
        tx.commit().await.context("Failed to commit conversation flag")?;
        Ok(Some(conversation))
    }

    async fn set_conversation_status(
        &self,
        id: i32,
        status: ConversationStatus,
    ) -> Result<Option<Conversation>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt(
                "UPDATE conversations SET status = $1 WHERE id = $2 RETURNING *",
                &[&status.as_str(), &id],
            )
            .await
            .context("Failed to update conversation status")?;
        Ok(row.map(|r| Conversation::from_row(&r)).transpose()?)
    }
}
