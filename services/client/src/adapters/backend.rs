//! services/client/src/adapters/backend.rs
//!
//! This module contains the REST adapter, the concrete implementation of
//! the `TutorBackendService` port from the `core` crate. It talks to the
//! tutoring product's backend over HTTP using `reqwest`.

use async_trait::async_trait;
use java_tutor_core::domain::{
    LessonPlan, Message, PracticeRef, QuizRef, QuizStatus, Session, SessionMetadata,
    TutorPreference,
};
use java_tutor_core::ports::{PortError, PortResult, TutorBackendService};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A REST adapter that implements the `TutorBackendService` port.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend`. The base URL is used as-is, without a
    /// trailing slash.
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Sends a request and maps transport and status failures into the
    /// port error taxonomy.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        path: &str,
    ) -> PortResult<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortError::Unauthorized),
            StatusCode::NOT_FOUND => Err(PortError::NotFound(path.to_string())),
            status => Err(PortError::Unexpected(format!(
                "{path} returned HTTP {status}"
            ))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PortResult<T> {
        let response = self.send(self.request(Method::GET, path), path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    /// Like [`HttpBackend::get_json`], but a 404 means "nothing to present"
    /// rather than an error.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> PortResult<Option<T>> {
        match self.get_json::<T>(path).await {
            Ok(value) => Ok(Some(value)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Deserialize)]
struct ProgressResponse {
    percent: u8,
}

//=========================================================================================
// Port Implementation
//=========================================================================================

#[async_trait]
impl TutorBackendService for HttpBackend {
    async fn fetch_active_session(&self, user_id: &str) -> PortResult<Option<Session>> {
        self.get_optional(&format!("/api/users/{user_id}/sessions/active"))
            .await
    }

    async fn reactivate_session(&self, session_id: &str) -> PortResult<Session> {
        let path = format!("/api/sessions/{session_id}/reactivate");
        let response = self.send(self.request(Method::POST, &path), &path).await?;
        response
            .json::<Session>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn deactivate_session(&self, session_id: &str) -> PortResult<()> {
        let path = format!("/api/sessions/{session_id}/deactivate");
        self.send(self.request(Method::POST, &path), &path).await?;
        Ok(())
    }

    async fn push_conversation(&self, session_id: i64, messages: &[Message]) -> PortResult<()> {
        let path = format!("/api/sessions/{session_id}/conversation");
        self.send(self.request(Method::PUT, &path).json(messages), &path)
            .await?;
        Ok(())
    }

    async fn push_metadata(&self, session_id: i64, metadata: &SessionMetadata) -> PortResult<()> {
        let path = format!("/api/sessions/{session_id}/metadata");
        self.send(self.request(Method::PUT, &path).json(metadata), &path)
            .await?;
        Ok(())
    }

    async fn lesson_quiz_statuses(&self, lesson_id: &str) -> PortResult<Vec<QuizStatus>> {
        self.get_json(&format!("/api/lessons/{lesson_id}/quizzes/status"))
            .await
    }

    async fn next_quiz(&self, lesson_id: &str) -> PortResult<Option<QuizRef>> {
        self.get_optional(&format!("/api/lessons/{lesson_id}/quizzes/next"))
            .await
    }

    async fn next_practice(&self, lesson_id: &str) -> PortResult<Option<PracticeRef>> {
        self.get_optional(&format!("/api/lessons/{lesson_id}/practice/next"))
            .await
    }

    async fn log_preference(&self, session_id: i64, choice: TutorPreference) -> PortResult<()> {
        let path = format!("/api/sessions/{session_id}/preference");
        self.send(
            self.request(Method::POST, &path)
                .json(&serde_json::json!({ "choice": choice })),
            &path,
        )
        .await?;
        Ok(())
    }

    async fn lesson_progress(&self, user_id: &str, lesson_id: &str) -> PortResult<u8> {
        let response: ProgressResponse = self
            .get_json(&format!("/api/users/{user_id}/lessons/{lesson_id}/progress"))
            .await?;
        Ok(response.percent.min(100))
    }

    async fn lesson_plans(&self, topic_id: &str) -> PortResult<Vec<LessonPlan>> {
        self.get_json(&format!("/api/topics/{topic_id}/lessons"))
            .await
    }
}
