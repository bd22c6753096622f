//! Server session tracking.
//!
//! The server hands out a session id from `GET /info`. Cached chat state is only
//! valid for the session it was fetched under, so a changed id wipes it before
//! anything else is loaded.

use std::sync::Arc;

use shared::{domain::SessionId, protocol::InfoResponse};
use storage::Storage;
use tracing::{info, warn};

use crate::{error::ClientResult, transport::ChatApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCheck {
    pub info: InfoResponse,
    pub rotated: bool,
    pub previous: Option<SessionId>,
}

pub struct SessionManager {
    api: Arc<dyn ChatApi>,
    storage: Storage,
}

impl SessionManager {
    pub fn new(api: Arc<dyn ChatApi>, storage: Storage) -> Self {
        Self { api, storage }
    }

    /// Puts the persisted session id back on the transport.
    pub async fn restore(&self) -> ClientResult<Option<SessionId>> {
        let session_id = self.storage.load_session_id().await?;
        self.api.set_session_id(session_id.clone()).await;
        Ok(session_id)
    }

    pub async fn check_session(&self) -> ClientResult<SessionCheck> {
        let info = self.api.info().await?;
        let previous = self.storage.load_session_id().await?;
        let rotated = previous.as_ref() != Some(&info.session_uuid);

        if rotated {
            self.storage.clear_chat_state().await?;
            self.storage.save_session_id(&info.session_uuid).await?;
            info!(
                previous = previous.as_ref().map(SessionId::as_str).unwrap_or("none"),
                current = %info.session_uuid,
                api_version = info.api_version,
                "session: new server session, local cache cleared"
            );
        }
        self.api
            .set_session_id(Some(info.session_uuid.clone()))
            .await;

        Ok(SessionCheck {
            info,
            rotated,
            previous,
        })
    }

    /// Drops every persisted key, the session id included.
    pub async fn invalidate(&self) -> ClientResult<()> {
        warn!("session: invalidated, clearing all local state");
        self.storage.clear_all().await?;
        self.api.set_session_id(None).await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
