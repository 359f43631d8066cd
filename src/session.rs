//! Request-scoped database sessions.
//!
//! A `Session` is a unit-of-work handle: it checks a connection out of the
//! shared pool on first use, keeps it pinned for its whole lifetime (so
//! explicit transactions work), and hands it back on `close`.
//!
//! A `RequestContext` owns at most one session per inbound request. The
//! session scope middleware creates the context, handlers reach the session
//! through the `Db` extractor, and the middleware closes it when the request
//! finishes.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use deadpool_postgres::{Object, Pool};
use postgres_types::ToSql;
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::ApiError;

#[derive(Default)]
struct SessionState {
    client: Option<Object>,
    in_transaction: bool,
    closed: bool,
}

impl SessionState {
    fn client(&self) -> Result<&Object, ApiError> {
        self.client.as_ref().ok_or(ApiError::SessionClosed)
    }
}

pub struct Session {
    id: Uuid,
    pool: Pool,
    echo: bool,
    state: Mutex<SessionState>,
}

impl Session {
    /// Bind a new session to `pool`. No connection is taken until the first statement.
    pub fn new(pool: Pool, echo: bool) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "Opened database session");

        Session {
            id,
            pool,
            echo,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Whether a pooled connection is currently pinned to this session.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.client.is_some()
    }

    pub async fn in_transaction(&self) -> bool {
        self.state.lock().await.in_transaction
    }

    /// Lock the session state, checking a connection out of the pool if none is pinned yet.
    async fn acquire(&self) -> Result<MutexGuard<'_, SessionState>, ApiError> {
        let mut state = self.state.lock().await;

        if state.closed {
            return Err(ApiError::SessionClosed);
        }

        if state.client.is_none() {
            let client = self.pool.get().await?;
            debug!(session = %self.id, "Checked out pooled connection");
            state.client = Some(client);
        }

        Ok(state)
    }

    fn log_statement(&self, sql: &str) {
        if self.echo {
            info!(session = %self.id, "{}", sql.trim());
        }
    }

    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, ApiError> {
        let state = self.acquire().await?;
        self.log_statement(sql);
        Ok(state.client()?.execute(sql, params).await?)
    }

    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>, ApiError> {
        let state = self.acquire().await?;
        self.log_statement(sql);
        Ok(state.client()?.query(sql, params).await?)
    }

    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row, ApiError> {
        let state = self.acquire().await?;
        self.log_statement(sql);
        Ok(state.client()?.query_one(sql, params).await?)
    }

    pub async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Option<Row>, ApiError> {
        let state = self.acquire().await?;
        self.log_statement(sql);
        Ok(state.client()?.query_opt(sql, params).await?)
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), ApiError> {
        let state = self.acquire().await?;
        self.log_statement(sql);
        Ok(state.client()?.batch_execute(sql).await?)
    }

    /// `SELECT 1` through this session's connection.
    pub async fn ping(&self) -> Result<(), ApiError> {
        self.execute("SELECT 1", &[]).await.map(|_| ())
    }

    pub async fn begin(&self) -> Result<(), ApiError> {
        let mut state = self.acquire().await?;
        if state.in_transaction {
            return Err(ApiError::Database("A transaction is already in progress".to_string()));
        }

        self.log_statement("BEGIN");
        state.client()?.batch_execute("BEGIN").await?;
        state.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. Without one this does nothing.
    pub async fn commit(&self) -> Result<(), ApiError> {
        self.finish_transaction("COMMIT").await
    }

    /// Roll back the open transaction. Without one this does nothing.
    pub async fn rollback(&self) -> Result<(), ApiError> {
        self.finish_transaction("ROLLBACK").await
    }

    async fn finish_transaction(&self, statement: &str) -> Result<(), ApiError> {
        let mut state = self.acquire().await?;
        if !state.in_transaction {
            return Ok(());
        }

        // The transaction is over once the statement is sent, even if it fails.
        state.in_transaction = false;
        self.log_statement(statement);
        state.client()?.batch_execute(statement).await?;
        Ok(())
    }

    /// Roll back any open transaction and return the connection to the pool.
    /// Closing twice is fine; rollback errors are returned to the caller.
    pub async fn close(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let in_transaction = std::mem::take(&mut state.in_transaction);
        let Some(client) = state.client.take() else {
            debug!(session = %self.id, "Closed database session");
            return Ok(());
        };

        if in_transaction {
            self.log_statement("ROLLBACK");
            if let Err(err) = client.batch_execute("ROLLBACK").await {
                warn!(session = %self.id, "Rollback on close failed, discarding connection: {}", err);
                drop(Object::take(client));
                return Err(err.into());
            }
        }

        drop(client);
        debug!(session = %self.id, "Closed database session");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.in_transaction {
            if let Some(client) = state.client.take() {
                // Never hand a connection with an open transaction back to the pool.
                warn!(session = %self.id, "Session dropped inside a transaction, discarding connection");
                drop(Object::take(client));
            }
        }
    }
}

/// Per-request holder of the database session.
pub struct RequestContext {
    database: Arc<Database>,
    session: StdMutex<Option<Arc<Session>>>,
}

impl RequestContext {
    pub fn new(database: Arc<Database>) -> Self {
        RequestContext {
            database,
            session: StdMutex::new(None),
        }
    }

    /// Session attached to this request, created on first call.
    /// Every call within the same request returns the same session.
    pub fn get_db(&self) -> Arc<Session> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| Arc::new(self.database.session()))
            .clone()
    }

    pub fn is_attached(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Detach the session and close it. Does nothing when no session was opened.
    pub async fn close_db(&self) -> Result<(), ApiError> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match session {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

/// Extractor handing a handler the session of the current request.
pub struct Db(pub Arc<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for Db
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<Arc<RequestContext>>()
            .ok_or_else(|| anyhow::anyhow!("request is not wrapped in a database session scope"))?;

        Ok(Db(context.get_db()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::lazy_database;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_get_db_is_idempotent_within_a_request() {
        let context = RequestContext::new(lazy_database());

        let first = context.get_db();
        let second = context.get_db();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id(), second.id());
        assert!(context.is_attached());
    }

    #[tokio::test]
    async fn test_session_is_lazy() {
        let context = RequestContext::new(lazy_database());
        let session = context.get_db();

        assert!(!session.is_connected().await);
        assert!(!session.in_transaction().await);
    }

    #[tokio::test]
    async fn test_close_db_detaches_and_closes() {
        let context = RequestContext::new(lazy_database());
        let session = context.get_db();

        assert_ok!(context.close_db().await);

        assert!(!context.is_attached());
        assert!(session.is_closed().await);
    }

    #[tokio::test]
    async fn test_close_db_without_session_is_noop() {
        let context = RequestContext::new(lazy_database());

        assert_ok!(context.close_db().await);
        assert_ok!(context.close_db().await);
        assert!(!context.is_attached());
    }

    #[tokio::test]
    async fn test_new_request_gets_distinct_session() {
        let database = lazy_database();

        let first_request = RequestContext::new(database.clone());
        let first = first_request.get_db();
        assert_ok!(first_request.close_db().await);

        let second_request = RequestContext::new(database);
        let second = second_request.get_db();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.id(), second.id());
        assert!(!second.is_closed().await);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_statements() {
        let session = lazy_database().session();
        assert_ok!(session.close().await);

        let result = session.ping().await;
        assert!(matches!(result, Err(ApiError::SessionClosed)));
        assert_err!(session.begin().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = lazy_database().session();

        assert_ok!(session.close().await);
        assert_ok!(session.close().await);
        assert!(session.is_closed().await);
    }

    #[tokio::test]
    async fn test_unreachable_database_surfaces_pool_error() {
        let session = lazy_database().session();

        let result = session.ping().await;
        assert!(matches!(result, Err(ApiError::Pool(_))));
        assert!(!session.is_connected().await);
    }
}
