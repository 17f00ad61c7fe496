use anyhow::{anyhow, Result};
use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{CreateTokenRequest, QueueToken, TokenStatus, PRIORITY_NORMAL};

const ACTIVE_STATUSES: &str = "in.(waiting,called,in_progress)";
const TOKEN_SELECT: &str =
    "select=*,patient:patients(firstName:first_name,lastName:last_name)";

/// Typed access to the `queue_tokens` table. The store is the source of
/// truth for queue order and token status; per-doctor write consistency is
/// its responsibility, this service only reads fresh snapshots and applies
/// the mutations staff actions request.
pub struct QueueStoreService {
    supabase: SupabaseClient,
}

impl QueueStoreService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Waiting tokens for one doctor, oldest first.
    pub async fn list_waiting_tokens(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<QueueToken>> {
        let path = format!(
            "/rest/v1/queue_tokens?doctor_id=eq.{}&status=eq.waiting&order=created_at.asc&{}",
            doctor_id, TOKEN_SELECT
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
    }

    /// Waiting plus currently-serving tokens. `doctor_id: None` spans the
    /// whole clinic (the clinic-wide admin feed).
    pub async fn list_active_tokens(
        &self,
        doctor_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<QueueToken>> {
        let path = match doctor_id {
            Some(doctor_id) => format!(
                "/rest/v1/queue_tokens?doctor_id=eq.{}&status={}&order=created_at.asc&{}",
                doctor_id, ACTIVE_STATUSES, TOKEN_SELECT
            ),
            None => format!(
                "/rest/v1/queue_tokens?status={}&order=created_at.asc&{}",
                ACTIVE_STATUSES, TOKEN_SELECT
            ),
        };
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
    }

    /// The patient's non-terminal token, if any. The store enforces at most
    /// one active token per (patient, doctor).
    pub async fn find_active_token_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<QueueToken>> {
        let path = format!(
            "/rest/v1/queue_tokens?patient_id=eq.{}&status={}&limit=1&{}",
            patient_id, ACTIVE_STATUSES, TOKEN_SELECT
        );
        let tokens: Vec<QueueToken> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        Ok(tokens.into_iter().next())
    }

    pub async fn get_token(&self, token_id: Uuid, auth_token: &str) -> Result<Option<QueueToken>> {
        let path = format!(
            "/rest/v1/queue_tokens?id=eq.{}&limit=1&{}",
            token_id, TOKEN_SELECT
        );
        let tokens: Vec<QueueToken> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        Ok(tokens.into_iter().next())
    }

    /// Next token number for the doctor's current session. Numbers restart
    /// each day and strictly increase within the session.
    pub async fn next_token_number(&self, doctor_id: Uuid, auth_token: &str) -> Result<i32> {
        let session_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let path = format!(
            "/rest/v1/queue_tokens?doctor_id=eq.{}&created_at=gte.{}&order=token_number.desc&limit=1&select=token_number",
            doctor_id, session_start
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let next = rows
            .first()
            .and_then(|row| row["token_number"].as_i64())
            .map(|n| n as i32 + 1)
            .unwrap_or(1);

        debug!("Next token number for doctor {}: {}", doctor_id, next);
        Ok(next)
    }

    pub async fn insert_token(
        &self,
        request: &CreateTokenRequest,
        token_number: i32,
        auth_token: &str,
    ) -> Result<QueueToken> {
        let body = json!({
            "token_number": token_number,
            "patient_id": request.patient_id,
            "doctor_id": request.doctor_id,
            "appointment_id": request.appointment_id,
            "status": TokenStatus::Waiting,
            "priority": request.priority.unwrap_or(PRIORITY_NORMAL),
            "estimated_wait_time": 0,
            "created_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<QueueToken> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/queue_tokens",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to create queue token"))
    }

    /// Apply a status transition and stamp the matching timestamp. The
    /// caller validates the transition before asking for it.
    pub async fn update_token_status(
        &self,
        token_id: Uuid,
        target: TokenStatus,
        auth_token: &str,
    ) -> Result<QueueToken> {
        let now = Utc::now().to_rfc3339();
        let mut body = json!({ "status": target });
        match target {
            TokenStatus::Called => {
                body["called_at"] = json!(now);
            }
            TokenStatus::Completed | TokenStatus::Missed => {
                body["completed_at"] = json!(now);
            }
            _ => {}
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let path = format!("/rest/v1/queue_tokens?id=eq.{}&{}", token_id, TOKEN_SELECT);
        let result: Vec<QueueToken> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Queue token {} not found", token_id))
    }

    /// Persist refreshed wait estimates so a client that drops to polling
    /// still sees a recent number.
    pub async fn update_wait_estimates(
        &self,
        estimates: &[(Uuid, i32)],
        auth_token: &str,
    ) -> Result<()> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        for (token_id, minutes) in estimates {
            let path = format!("/rest/v1/queue_tokens?id=eq.{}", token_id);
            let body = json!({ "estimated_wait_time": minutes });
            let _: Vec<Value> = self
                .supabase
                .request_with_headers(
                    Method::PATCH,
                    &path,
                    Some(auth_token),
                    Some(body),
                    Some(headers.clone()),
                )
                .await?;
        }

        Ok(())
    }
}
