//! Token-addressed map of live sessions.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::MusicSettings;
use crate::corpus::CoreInstance;
use crate::error::{MusicError, MusicResult};
use crate::search::buffer::SampleType;
use crate::search::workers::SearchWorkerPool;
use crate::session::model::Session;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    corpus: Arc<dyn CoreInstance>,
    pool: Arc<SearchWorkerPool>,
    settings: MusicSettings,
    /// Handed to sessions so an expiring one can remove itself without
    /// keeping the registry alive
    weak_self: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(
        corpus: Arc<dyn CoreInstance>,
        pool: Arc<SearchWorkerPool>,
        settings: MusicSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            sessions: DashMap::new(),
            corpus,
            pool,
            settings,
            weak_self: weak_self.clone(),
        })
    }

    /// Validate the session definition, spawn the session and hand out
    /// its opaque token.
    pub fn create_session(&self, session_info: &Value) -> MusicResult<Value> {
        let sample_type = session_info
            .get("sampleType")
            .and_then(Value::as_str)
            .and_then(SampleType::parse)
            .ok_or(MusicError::InvalidSampleType)?;
        let store_session_data = session_info.get("storeSessionData").is_some();

        let token = Uuid::new_v4().to_string();

        let registry = self.weak_self.clone();
        let expired_token = token.clone();
        let on_expire = Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.sessions.remove(&expired_token);
                info!("Session {expired_token} removed after idle timeout");
            }
        });

        let session = Session::spawn(
            token.clone(),
            sample_type,
            store_session_data,
            self.settings.clone(),
            Arc::clone(&self.corpus),
            Arc::clone(&self.pool),
            on_expire,
        );

        self.sessions.insert(token.clone(), session);
        info!("Created session {token}");

        Ok(json!({ "token": token, "result": "ok" }))
    }

    pub fn get_session_info(&self, token: &str) -> MusicResult<Value> {
        let session = self.find(
            token,
            "Unable to retrieve session information - token was not found",
        )?;
        Ok(session.get_information())
    }

    pub fn append_session_samples(&self, token: &str, samples: &[u8]) -> MusicResult<Value> {
        let session = self.find(
            token,
            "Unable to push samples to the session - token was not found",
        )?;
        session.push_samples(samples)
    }

    pub fn delete_session(&self, token: &str) -> MusicResult<Value> {
        match self.sessions.remove(token) {
            Some((_, session)) => {
                session.shutdown();
                info!("Deleted session {token}");
                Ok(json!({ "result": "ok" }))
            }
            None => Err(MusicError::NotFound(format!(
                "Unable to find session to remove - token was not found: {token}"
            ))),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn find(&self, token: &str, message: &str) -> MusicResult<Arc<Session>> {
        self.sessions
            .get(token)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MusicError::NotFound(format!("{message}: {token}")))
    }
}
