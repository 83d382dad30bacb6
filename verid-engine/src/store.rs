//! Persistence traits for sessions and their evidence records.
//!
//! The engine only ever needs simple CRUD plus two query shapes: evidence by
//! session id newest-first, and expired non-terminal sessions for the sweep.
//! The in-memory backend in [`memory`] is the reference implementation;
//! database-backed deployments implement these traits over their own pool.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use verid_core::{Document, FaceMatch, LivenessResult, Session};

use crate::error::StorageError;

type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Session>>;
    /// Full-record replacement keyed by id.
    async fn update(&self, session: Session) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Sessions past their expiry that still hold a non-terminal status.
    async fn find_expired_non_terminal(&self, now: DateTime<Utc>) -> Result<Vec<Session>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: Document) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Document>>;
    async fn update(&self, document: Document) -> Result<()>;
    /// All documents for a session, newest first.
    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<Document>>;
    async fn delete_by_session(&self, session_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait FaceMatchStore: Send + Sync {
    async fn insert(&self, face_match: FaceMatch) -> Result<()>;
    /// All face matches for a session, newest first.
    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<FaceMatch>>;
    async fn delete_by_session(&self, session_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait LivenessStore: Send + Sync {
    async fn insert(&self, result: LivenessResult) -> Result<()>;
    /// All liveness results for a session, newest first.
    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<LivenessResult>>;
    async fn delete_by_session(&self, session_id: Uuid) -> Result<()>;
}
