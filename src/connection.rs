//! High-level Connection API for Teradata sessions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::binding::{ConnectionHandle, DriverBinding};
use crate::cursor::RowCursor;
use crate::error::{Error, Result};
use crate::logging::{LogMask, MethodScope};
use crate::protocol::connect::{ClientAttributes, ConnectParams};
use crate::protocol::constants::DRIVER_VERSION;

/// Mutable session state. Holding its lock serializes binding calls.
#[derive(Debug)]
pub(crate) struct SessionState {
    /// `None` once the session is closed.
    handle: Option<ConnectionHandle>,
    pub autocommit: bool,
    pub database_version: String,
    pub session_number: u64,
}

impl SessionState {
    pub fn handle(&self) -> Result<ConnectionHandle> {
        self.handle.ok_or(Error::ConnectionClosed)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

/// A session shared by its connection and cursors.
pub(crate) struct Session<B: DriverBinding> {
    pub binding: Arc<B>,
    pub state: Mutex<SessionState>,
    pub log: LogMask,
    /// `fake_result_sets=true` connection parameter.
    pub fake_result_sets: bool,
    request_timeout: Option<Duration>,
}

impl<B: DriverBinding> Session<B> {
    /// Apply the request timeout to a binding call.
    pub async fn timed<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| Error::RequestTimeout { timeout })?,
            None => call.await,
        }
    }

    pub async fn commit(&self, state: &SessionState) -> Result<()> {
        let conn = state.handle()?;
        if state.autocommit {
            return Err(Error::invalid_state("commit is not valid while autocommit is on"));
        }
        self.timed(self.binding.commit(conn)).await
    }

    pub async fn rollback(&self, state: &SessionState) -> Result<()> {
        let conn = state.handle()?;
        if state.autocommit {
            return Err(Error::invalid_state("rollback is not valid while autocommit is on"));
        }
        self.timed(self.binding.rollback(conn)).await
    }

    pub async fn set_autocommit(&self, state: &mut SessionState, autocommit: bool) -> Result<()> {
        let conn = state.handle()?;
        self.timed(self.binding.set_autocommit(conn, autocommit)).await?;
        state.autocommit = autocommit;
        Ok(())
    }
}

/// A Teradata database session.
///
/// Cursors created by [`Connection::cursor`] share the session and its
/// transaction. Dropping a connection without [`Connection::close`] leaves
/// the session open in the binding.
pub struct Connection<B: DriverBinding> {
    session: Arc<Session<B>>,
}

impl<B: DriverBinding> Connection<B> {
    /// Log on through `binding`.
    ///
    /// Parameters are validated and stored password protection is resolved
    /// before the binding sees them. Session creation is bounded by
    /// `connect_timeout`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use teradatasql_rs::{ConnectParams, Connection, MemoryBinding};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let params = ConnectParams::from_json(
    ///         r#"{"host":"whomooz","user":"guest","password":"please"}"#,
    ///     )?;
    ///     let conn = Connection::connect(Arc::new(MemoryBinding::new()), params).await?;
    ///     println!("session {}", conn.session_number().await?);
    ///     conn.close().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(binding: Arc<B>, params: ConnectParams) -> Result<Self> {
        let log = params.log_mask()?;
        let _scope = MethodScope::new(log, "connect");
        let logon = params.prepare_logon().await?;
        let fake_result_sets = params.fake_result_sets_enabled()?;
        let client = ClientAttributes::current();

        let timeout = params.connect_timeout;
        let handle = tokio::time::timeout(timeout, binding.create_connection(&logon, &client))
            .await
            .map_err(|_| Error::ConnectionTimeout {
                host: params.host.clone(),
                timeout,
            })??;

        let mut session = Session {
            binding,
            state: Mutex::new(SessionState {
                handle: Some(handle),
                autocommit: true,
                database_version: String::new(),
                session_number: 0,
            }),
            log,
            fake_result_sets,
            request_timeout: params.request_timeout,
        };
        let identity = async {
            let version = session.timed(session.binding.database_version(handle)).await?;
            let number = session.timed(session.binding.session_number(handle)).await?;
            Ok::<_, Error>((version, number))
        };
        let (database_version, session_number) = match identity.await {
            Ok(identity) => identity,
            Err(err) => {
                // Don't leak the half-initialized session.
                let _ = session.binding.close_connection(handle).await;
                return Err(err);
            }
        };
        {
            let state = session.state.get_mut();
            state.database_version = database_version;
            state.session_number = session_number;
        }
        log.debug(|| {
            format!(
                "session {} logged on to {} as {}",
                session_number,
                params.host,
                params.user.as_deref().unwrap_or_default()
            )
        });

        Ok(Self {
            session: Arc::new(session),
        })
    }

    /// Create a cursor on this session.
    pub async fn cursor(&self) -> Result<RowCursor<B>> {
        let state = self.session.state.lock().await;
        state.handle()?;
        Ok(RowCursor::new(Arc::clone(&self.session)))
    }

    /// Commit the open transaction. Only valid with autocommit off.
    pub async fn commit(&self) -> Result<()> {
        let _scope = MethodScope::new(self.session.log, "commit");
        let state = self.session.state.lock().await;
        self.session.commit(&state).await
    }

    /// Roll back the open transaction. Only valid with autocommit off.
    pub async fn rollback(&self) -> Result<()> {
        let _scope = MethodScope::new(self.session.log, "rollback");
        let state = self.session.state.lock().await;
        self.session.rollback(&state).await
    }

    pub async fn autocommit(&self) -> Result<bool> {
        let state = self.session.state.lock().await;
        state.handle()?;
        Ok(state.autocommit)
    }

    /// Switch autocommit on or off. Switching it on commits the open
    /// transaction.
    pub async fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        let _scope = MethodScope::new(self.session.log, "set_autocommit");
        let mut state = self.session.state.lock().await;
        self.session.set_autocommit(&mut state, autocommit).await
    }

    /// Log off. Cursors of the session fail with
    /// [`Error::ConnectionClosed`] afterwards, and so does a second close.
    pub async fn close(&self) -> Result<()> {
        let _scope = MethodScope::new(self.session.log, "close");
        let mut state = self.session.state.lock().await;
        let conn = state.handle()?;
        state.handle = None;
        self.session
            .timed(self.session.binding.close_connection(conn))
            .await
    }

    pub async fn is_closed(&self) -> bool {
        !self.session.state.lock().await.is_open()
    }

    /// Database version reported at logon.
    pub async fn database_version(&self) -> Result<String> {
        let state = self.session.state.lock().await;
        state.handle()?;
        Ok(state.database_version.clone())
    }

    pub async fn session_number(&self) -> Result<u64> {
        let state = self.session.state.lock().await;
        state.handle()?;
        Ok(state.session_number)
    }

    /// Version of this driver.
    pub fn driver_version(&self) -> &'static str {
        DRIVER_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::MemoryBinding;
    use crate::error::ErrorKind;

    async fn open() -> Connection<MemoryBinding> {
        Connection::connect(Arc::new(MemoryBinding::new()), ConnectParams::new("localhost"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_identity() {
        let conn = open().await;
        assert_eq!(conn.database_version().await.unwrap(), "17.20.03.09");
        assert!(conn.session_number().await.unwrap() > 0);
        assert!(conn.autocommit().await.unwrap());
        assert_eq!(conn.driver_version(), DRIVER_VERSION);
    }

    #[tokio::test]
    async fn test_commit_requires_autocommit_off() {
        let conn = open().await;
        assert_eq!(conn.commit().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(conn.rollback().await.unwrap_err().kind(), ErrorKind::State);
        conn.set_autocommit(false).await.unwrap();
        conn.commit().await.unwrap();
        conn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_calls() {
        let conn = open().await;
        conn.close().await.unwrap();
        assert!(conn.is_closed().await);
        assert!(matches!(conn.close().await, Err(Error::ConnectionClosed)));
        assert!(matches!(conn.cursor().await, Err(Error::ConnectionClosed)));
        assert!(matches!(conn.commit().await, Err(Error::ConnectionClosed)));
        assert!(matches!(conn.set_autocommit(false).await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_invalid_params_fail_before_logon() {
        let binding = Arc::new(MemoryBinding::new());
        let err = Connection::connect(Arc::clone(&binding), ConnectParams::new("h").with_tmode("BOGUS"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(binding.open_sessions().await, 0);
    }
}
