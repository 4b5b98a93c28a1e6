//! In-memory doubles for handler tests.
//!
//! `MemoryRepository` mirrors the PostgreSQL schema's rules (unique keys,
//! cascades on student deletion, canonical conversation pairs) so routes can be
//! exercised through the real router without a database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{Result, bail};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, Params, Version};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;

use crate::auth::jwt::JwtService;
use crate::config::{AuthConfig, ServicesConfig};
use crate::database::Repository;
use crate::database::models::{
    AccountType, Admin, Conversation, ConversationStatus, Message, NewAdmin, NewStudent, Student,
    StudentLink, User, UserSummary,
};
use crate::server::{AppState, build_router};
use crate::services::{ConnectorError, RecordStore, RemoteRow, StudentRecord, WorkflowEngine};

// ============================================================================
// REPOSITORY
// ============================================================================

#[derive(Debug, Clone)]
enum Account {
    Admin(Admin),
    Student(Student),
}

impl Account {
    fn user(&self) -> &User {
        match self {
            Account::Admin(admin) => &admin.user,
            Account::Student(student) => &student.user,
        }
    }

    fn user_mut(&mut self) -> &mut User {
        match self {
            Account::Admin(admin) => &mut admin.user,
            Account::Student(student) => &mut student.user,
        }
    }
}

#[derive(Default)]
struct Tables {
    next_user_id: i32,
    next_message_id: i32,
    next_conversation_id: i32,
    accounts: BTreeMap<i32, Account>,
    messages: Vec<Message>,
    conversations: Vec<Conversation>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.accounts.values().any(|a| a.user().email == email)
    }

    fn new_user(&mut self, account_type: AccountType, fields: [String; 4]) -> User {
        let [name, surname, email, password_hash] = fields;
        self.next_user_id += 1;
        User {
            id: self.next_user_id,
            name,
            surname,
            email,
            password_hash,
            avatar: None,
            account_type,
            created_at: Utc::now(),
        }
    }

    fn insert_admin(&mut self, new: NewAdmin) -> Result<Admin> {
        if self.email_taken(&new.email) {
            bail!("duplicate key value violates unique constraint \"users_email_key\"");
        }
        let user = self.new_user(
            AccountType::Admin,
            [new.name, new.surname, new.email, new.password_hash],
        );
        let admin = Admin {
            user,
            username: new.username,
        };
        self.accounts
            .insert(admin.user.id, Account::Admin(admin.clone()));
        Ok(admin)
    }

    fn conversation_for_pair(&mut self, user_a: i32, user_b: i32) -> &mut Conversation {
        let (one, two) = Conversation::canonical_pair(user_a, user_b);
        let position = self
            .conversations
            .iter()
            .position(|c| c.user_one_id == one && c.user_two_id == two);
        let index = match position {
            Some(index) => index,
            None => {
                self.next_conversation_id += 1;
                self.conversations.push(Conversation {
                    id: self.next_conversation_id,
                    user_one_id: one,
                    user_two_id: two,
                    user_one_last_read_id: None,
                    user_two_last_read_id: None,
                    user_one_active: true,
                    user_two_active: true,
                    status: ConversationStatus::Open,
                    timestamp: Utc::now(),
                });
                self.conversations.len() - 1
            }
        };
        &mut self.conversations[index]
    }

    fn conversation_mut(&mut self, id: i32) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }
}

fn between(message: &Message, a: i32, b: i32) -> bool {
    (message.sender_id == a && message.receiver_id == b)
        || (message.sender_id == b && message.receiver_id == a)
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .values()
            .map(Account::user)
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.accounts.get(&id).map(|a| a.user().clone()))
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<UserSummary> = tables
            .accounts
            .values()
            .map(|a| UserSummary::from(a.user()))
            .collect();
        users.sort_by(|a, b| (&a.surname, &a.name).cmp(&(&b.surname, &b.name)));
        Ok(users)
    }

    async fn find_student(&self, id: i32) -> Result<Option<Student>> {
        let tables = self.tables.lock().await;
        Ok(match tables.accounts.get(&id) {
            Some(Account::Student(student)) => Some(student.clone()),
            _ => None,
        })
    }

    async fn find_admin(&self, id: i32) -> Result<Option<Admin>> {
        let tables = self.tables.lock().await;
        Ok(match tables.accounts.get(&id) {
            Some(Account::Admin(admin)) => Some(admin.clone()),
            _ => None,
        })
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .values()
            .any(|a| matches!(a, Account::Admin(admin) if admin.username == username)))
    }

    async fn jmbag_taken(&self, jmbag: &str) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .values()
            .any(|a| matches!(a, Account::Student(student) if student.jmbag == jmbag)))
    }

    async fn count_admins(&self) -> Result<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .values()
            .filter(|a| matches!(a, Account::Admin(_)))
            .count() as i64)
    }

    async fn insert_student(&self, new: NewStudent) -> Result<Student> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(&new.email) {
            bail!("duplicate key value violates unique constraint \"users_email_key\"");
        }
        let user = tables.new_user(
            AccountType::Student,
            [new.name, new.surname, new.email, new.password_hash],
        );
        let student = Student {
            user,
            jmbag: new.jmbag,
            year_of_study: new.year_of_study,
            baserow_id: new.baserow_id,
            process_instance_id: None,
        };
        tables
            .accounts
            .insert(student.user.id, Account::Student(student.clone()));
        Ok(student)
    }

    async fn insert_admin(&self, new: NewAdmin) -> Result<Admin> {
        self.tables.lock().await.insert_admin(new)
    }

    async fn insert_first_admin(&self, new: NewAdmin) -> Result<Option<Admin>> {
        let mut tables = self.tables.lock().await;
        if tables.accounts.values().any(|a| matches!(a, Account::Admin(_))) {
            return Ok(None);
        }
        tables.insert_admin(new).map(Some)
    }

    async fn update_password(&self, user_id: i32, password_hash: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.accounts.get_mut(&user_id) {
            Some(account) => {
                account.user_mut().password_hash = password_hash.to_string();
                true
            }
            None => false,
        })
    }

    async fn update_avatar(&self, user_id: i32, avatar: &str) -> Result<Option<User>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.accounts.get_mut(&user_id).map(|account| {
            let user = account.user_mut();
            user.avatar = Some(avatar.to_string());
            user.clone()
        }))
    }

    async fn set_process_instance(
        &self,
        student_id: i32,
        process_instance_id: Option<&str>,
    ) -> Result<Option<Student>> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.accounts.get_mut(&student_id) {
            Some(Account::Student(student)) => {
                student.process_instance_id = process_instance_id.map(str::to_string);
                Some(student.clone())
            }
            _ => None,
        })
    }

    async fn student_links(&self) -> Result<Vec<StudentLink>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .values()
            .filter_map(|a| match a {
                Account::Student(student) => Some(StudentLink {
                    id: student.user.id,
                    baserow_id: student.baserow_id,
                    process_instance_id: student.process_instance_id.clone(),
                }),
                Account::Admin(_) => None,
            })
            .collect())
    }

    async fn delete_student(&self, id: i32) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !matches!(tables.accounts.get(&id), Some(Account::Student(_))) {
            return Ok(false);
        }
        tables.accounts.remove(&id);

        let removed: Vec<i32> = tables
            .messages
            .iter()
            .filter(|m| m.sender_id == id || m.receiver_id == id)
            .map(|m| m.id)
            .collect();
        tables
            .messages
            .retain(|m| m.sender_id != id && m.receiver_id != id);
        tables
            .conversations
            .retain(|c| c.user_one_id != id && c.user_two_id != id);
        for conversation in &mut tables.conversations {
            for marker in [
                &mut conversation.user_one_last_read_id,
                &mut conversation.user_two_last_read_id,
            ] {
                if marker.is_some_and(|m| removed.contains(&m)) {
                    *marker = None;
                }
            }
        }
        Ok(true)
    }

    async fn send_message(
        &self,
        sender_id: i32,
        receiver_id: i32,
        content: &str,
    ) -> Result<(Message, Conversation)> {
        let mut tables = self.tables.lock().await;
        if !tables.accounts.contains_key(&sender_id) || !tables.accounts.contains_key(&receiver_id) {
            bail!("insert or update on table \"messages\" violates foreign key constraint");
        }

        tables.next_message_id += 1;
        let message = Message {
            id: tables.next_message_id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        tables.messages.push(message.clone());

        let conversation = tables.conversation_for_pair(sender_id, receiver_id);
        conversation.record_sent(&message);
        let conversation = conversation.clone();
        Ok((message, conversation))
    }

    async fn messages_between(&self, user_a: i32, user_b: i32) -> Result<Vec<Message>> {
        let tables = self.tables.lock().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| between(m, user_a, user_b))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.timestamp, m.id));
        Ok(messages)
    }

    async fn conversations_for(&self, user_id: i32) -> Result<Vec<Conversation>> {
        let tables = self.tables.lock().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.is_active_for(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(conversations)
    }

    async fn open_conversation(&self, user_id: i32, participant_id: i32) -> Result<Conversation> {
        let mut tables = self.tables.lock().await;
        let conversation = tables.conversation_for_pair(user_id, participant_id);
        conversation.set_active(user_id, true);
        Ok(conversation.clone())
    }

    async fn find_conversation(&self, id: i32) -> Result<Option<Conversation>> {
        let tables = self.tables.lock().await;
        Ok(tables.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn mark_conversation_read(&self, id: i32, user_id: i32) -> Result<Option<Conversation>> {
        let mut tables = self.tables.lock().await;
        let Some((one, two)) = tables
            .conversations
            .iter()
            .find(|c| c.id == id)
            .map(|c| (c.user_one_id, c.user_two_id))
        else {
            return Ok(None);
        };
        let latest = tables
            .messages
            .iter()
            .filter(|m| between(m, one, two))
            .max_by_key(|m| (m.timestamp, m.id))
            .map(|m| m.id);

        Ok(tables.conversation_mut(id).and_then(|conversation| {
            conversation
                .mark_read(user_id, latest)
                .then(|| conversation.clone())
        }))
    }

    async fn set_conversation_active(
        &self,
        id: i32,
        user_id: i32,
        active: bool,
    ) -> Result<Option<Conversation>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.conversation_mut(id).and_then(|conversation| {
            conversation
                .set_active(user_id, active)
                .then(|| conversation.clone())
        }))
    }

    async fn set_conversation_status(
        &self,
        id: i32,
        status: ConversationStatus,
    ) -> Result<Option<Conversation>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.conversation_mut(id).map(|conversation| {
            conversation.status = status;
            conversation.clone()
        }))
    }
}

// ============================================================================
// CONNECTORS
// ============================================================================

#[derive(Default)]
struct RecordStoreState {
    next_id: i32,
    students: Vec<RemoteRow>,
    companies: Vec<RemoteRow>,
    admin_companies: Vec<RemoteRow>,
    created: Vec<StudentRecord>,
    deleted_emails: Vec<String>,
    failure: Option<String>,
}

/// Record store that keeps rows in memory and remembers every call
#[derive(Default)]
pub struct FakeRecordStore {
    state: StdMutex<RecordStoreState>,
}

fn as_row(value: Value) -> RemoteRow {
    match value {
        Value::Object(row) => row,
        other => panic!("record-store rows are JSON objects, got {other}"),
    }
}

impl FakeRecordStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, RecordStoreState> {
        self.state.lock().unwrap()
    }

    fn check(&self) -> Result<(), ConnectorError> {
        match &self.lock().failure {
            Some(reason) => Err(ConnectorError::UnexpectedResponse(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn add_student(&self, row: Value) {
        self.lock().students.push(as_row(row));
    }

    pub fn add_company(&self, row: Value) {
        self.lock().companies.push(as_row(row));
    }

    pub fn add_admin_company(&self, row: Value) {
        self.lock().admin_companies.push(as_row(row));
    }

    /// Make every following call fail with `reason`
    pub fn fail_with(&self, reason: &str) {
        self.lock().failure = Some(reason.to_string());
    }

    pub fn created(&self) -> Vec<StudentRecord> {
        self.lock().created.clone()
    }

    /// Id handed out by the latest `create_student`
    pub fn last_id(&self) -> i32 {
        self.lock().next_id
    }

    pub fn deleted_emails(&self) -> Vec<String> {
        self.lock().deleted_emails.clone()
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn create_student(&self, record: &StudentRecord) -> Result<i32, ConnectorError> {
        self.check()?;
        let mut state = self.lock();
        state.next_id += 1;
        state.created.push(record.clone());
        Ok(state.next_id)
    }

    async fn list_students(&self) -> Result<Vec<RemoteRow>, ConnectorError> {
        self.check()?;
        Ok(self.lock().students.clone())
    }

    async fn list_companies(&self) -> Result<Vec<RemoteRow>, ConnectorError> {
        self.check()?;
        Ok(self.lock().companies.clone())
    }

    async fn list_admin_companies(&self) -> Result<Vec<RemoteRow>, ConnectorError> {
        self.check()?;
        Ok(self.lock().admin_companies.clone())
    }

    async fn delete_student_by_email(&self, email: &str) -> Result<(), ConnectorError> {
        self.check()?;
        self.lock().deleted_emails.push(email.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWorkflowEngine {
    deleted: StdMutex<Vec<String>>,
    failure: StdMutex<Option<String>>,
}

impl FakeWorkflowEngine {
    pub fn deleted_instances(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Make every following call fail with `reason`
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl WorkflowEngine for FakeWorkflowEngine {
    async fn delete_instance(&self, instance_id: &str) -> Result<(), ConnectorError> {
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(ConnectorError::UnexpectedResponse(reason));
        }
        self.deleted.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

/// Connector settings pointing both services at `base_url`
pub fn services_config(base_url: &str) -> ServicesConfig {
    ServicesConfig {
        record_store_url: base_url.to_string(),
        workflow_engine_url: base_url.to_string(),
        students_table: "studenti".to_string(),
        companies_table: "poslodavci".to_string(),
        admin_companies_table: "firme".to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

// ============================================================================
// APP
// ============================================================================

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        secret_key: "test-secret".to_string(),
        algorithm: jsonwebtoken::Algorithm::HS256,
        access_token_expire_minutes: 30,
        remember_me_expire_minutes: 10080,
    }
}

/// Argon2 with tiny parameters; verification reads them back from the PHC string.
fn quick_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

/// The real router wired to in-memory collaborators
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub record_store: Arc<FakeRecordStore>,
    pub engine: Arc<FakeWorkflowEngine>,
    pub jwt: Arc<JwtService>,
}

impl TestApp {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryRepository::default());
        let record_store = Arc::new(FakeRecordStore::default());
        let engine = Arc::new(FakeWorkflowEngine::default());
        let jwt = Arc::new(JwtService::new(&test_auth_config()));

        let router = build_router(AppState {
            repo: repo.clone(),
            record_store: record_store.clone(),
            workflow_engine: engine.clone(),
            jwt_service: jwt.clone(),
        });

        Self {
            router,
            repo,
            record_store,
            engine,
            jwt,
        }
    }

    pub async fn seed_student(
        &self,
        email: &str,
        password: &str,
        baserow_id: i32,
        process_instance_id: Option<&str>,
    ) -> Student {
        let (local, _) = email.split_once('@').unwrap();
        let student = self
            .repo
            .insert_student(NewStudent {
                name: local.to_string(),
                surname: "Test".to_string(),
                email: email.to_string(),
                password_hash: quick_hash(password),
                jmbag: format!("00{baserow_id:08}"),
                year_of_study: "2".to_string(),
                baserow_id,
            })
            .await
            .unwrap();

        match process_instance_id {
            Some(instance) => self
                .repo
                .set_process_instance(student.user.id, Some(instance))
                .await
                .unwrap()
                .unwrap(),
            None => student,
        }
    }

    pub async fn seed_admin(&self, email: &str, password: &str) -> Admin {
        let (local, _) = email.split_once('@').unwrap();
        self.repo
            .insert_admin(NewAdmin {
                name: local.to_string(),
                surname: "Admin".to_string(),
                email: email.to_string(),
                password_hash: quick_hash(password),
                username: local.to_string(),
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user_id: i32, email: &str) -> String {
        self.jwt.create_token(user_id, email, false).unwrap().token
    }

    /// Send a JSON request; empty response bodies come back as `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    /// Send a form-encoded POST
    pub async fn form(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = tokio::time::timeout(
            Duration::from_secs(30),
            self.router.clone().oneshot(request),
        )
        .await
        .expect("request timed out")
        .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
