//! In-memory storage backends.
//!
//! DashMap-backed reference implementations of the persistence traits, used
//! by the test suites and by deployments that keep sessions ephemeral.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use verid_core::{Document, FaceMatch, LivenessResult, Session};

use super::{DocumentStore, FaceMatchStore, LivenessStore, SessionStore};
use crate::error::StorageError;

type Result<T> = std::result::Result<T, StorageError>;

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn update(&self, session: Session) -> Result<()> {
        if !self.sessions.contains_key(&session.id) {
            return Err(StorageError::Backend(format!(
                "session {} not found for update",
                session.id
            )));
        }
        self.sessions.insert(session.id, session);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn find_expired_non_terminal(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| !s.status.is_terminal() && s.is_expired(now))
            .map(|s| s.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<Uuid, Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, document: Document) -> Result<()> {
        self.documents.insert(document.id, document);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.documents.get(&id).map(|d| d.clone()))
    }

    async fn update(&self, document: Document) -> Result<()> {
        if !self.documents.contains_key(&document.id) {
            return Err(StorageError::Backend(format!(
                "document {} not found for update",
                document.id
            )));
        }
        self.documents.insert(document.id, document);
        Ok(())
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| d.session_id == session_id)
            .map(|d| d.clone())
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn delete_by_session(&self, session_id: Uuid) -> Result<()> {
        self.documents.retain(|_, d| d.session_id != session_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFaceMatchStore {
    matches: DashMap<Uuid, FaceMatch>,
}

impl MemoryFaceMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FaceMatchStore for MemoryFaceMatchStore {
    async fn insert(&self, face_match: FaceMatch) -> Result<()> {
        self.matches.insert(face_match.id, face_match);
        Ok(())
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<FaceMatch>> {
        let mut matches: Vec<FaceMatch> = self
            .matches
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.clone())
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn delete_by_session(&self, session_id: Uuid) -> Result<()> {
        self.matches.retain(|_, m| m.session_id != session_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLivenessStore {
    results: DashMap<Uuid, LivenessResult>,
}

impl MemoryLivenessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LivenessStore for MemoryLivenessStore {
    async fn insert(&self, result: LivenessResult) -> Result<()> {
        self.results.insert(result.id, result);
        Ok(())
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<LivenessResult>> {
        let mut results: Vec<LivenessResult> = self
            .results
            .iter()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.clone())
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    async fn delete_by_session(&self, session_id: Uuid) -> Result<()> {
        self.results.retain(|_, r| r.session_id != session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use verid_core::{DocumentKind, SessionStatus, VerificationType};

    fn session(expires_in: Duration) -> Session {
        Session::new("hash".into(), VerificationType::Full, Utc::now() + expires_in)
    }

    #[tokio::test]
    async fn test_session_crud() {
        let store = MemorySessionStore::new();
        let session = session(Duration::hours(24));
        let id = session.id;

        store.insert(session.clone()).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().id, id);

        let mut updated = session;
        updated.progress = 50;
        store.update(updated).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().progress, 50);

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_of_unknown_session_fails() {
        let store = MemorySessionStore::new();
        let err = store.update(session(Duration::hours(1))).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[tokio::test]
    async fn test_find_expired_skips_terminal() {
        let store = MemorySessionStore::new();

        let mut expired = session(Duration::hours(1));
        expired.expires_at = Utc::now() - Duration::hours(1);
        let expired_id = expired.id;
        store.insert(expired).await.unwrap();

        let mut done = session(Duration::hours(1));
        done.expires_at = Utc::now() - Duration::hours(1);
        done.status = SessionStatus::Approved;
        store.insert(done).await.unwrap();

        store.insert(session(Duration::hours(1))).await.unwrap();

        let found = store.find_expired_non_terminal(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired_id);
    }

    #[tokio::test]
    async fn test_documents_ordered_newest_first() {
        let store = MemoryDocumentStore::new();
        let session_id = Uuid::new_v4();

        let mut older = Document::new(session_id, DocumentKind::Passport, "a".into());
        older.created_at = Utc::now() - Duration::minutes(5);
        let mut newer = Document::new(session_id, DocumentKind::IdCard, "b".into());
        newer.created_at = Utc::now();

        store.insert(older).await.unwrap();
        store.insert(newer.clone()).await.unwrap();
        store
            .insert(Document::new(Uuid::new_v4(), DocumentKind::Other, "c".into()))
            .await
            .unwrap();

        let found = store.find_by_session(session_id).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_delete_by_session() {
        let store = MemoryDocumentStore::new();
        let session_id = Uuid::new_v4();
        store
            .insert(Document::new(session_id, DocumentKind::Passport, "a".into()))
            .await
            .unwrap();
        store
            .insert(Document::new(session_id, DocumentKind::IdCard, "b".into()))
            .await
            .unwrap();

        store.delete_by_session(session_id).await.unwrap();
        assert!(store.find_by_session(session_id).await.unwrap().is_empty());
    }
}
