use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use checkin_core::calls::CallRecord;
use checkin_core::script::conversation_script;

use super::{CallInitiator, CallRequest, InitiateError, prepare, refreshed};
use crate::config::ProviderConfig;
use crate::store::CallStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const LANGUAGE: &str = "en";
const TEMPERATURE: f64 = 0.7;
const MAX_DURATION_SECONDS: u32 = 300;

#[derive(Debug, Serialize)]
struct OutboundCall<'a> {
    contact_address: &'a str,
    script_text: &'a str,
    language: &'static str,
    temperature: f64,
    max_duration_seconds: u32,
    callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AcceptedCall {
    #[serde(default, alias = "provider_call_id")]
    call_id: Option<String>,
}

/// Places calls through the external voice API. One bounded request per call, never retried.
pub struct ProviderCallInitiator {
    store: Arc<dyn CallStore>,
    http: reqwest::Client,
    config: ProviderConfig,
    callback_url: String,
}

impl ProviderCallInitiator {
    pub fn new(
        store: Arc<dyn CallStore>,
        config: ProviderConfig,
        callback_url: String,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            store,
            http,
            config,
            callback_url,
        })
    }

    async fn fail(&self, call_id: Uuid, detail: String) -> Result<CallRecord, InitiateError> {
        tracing::warn!(%call_id, detail = %detail, "Provider call initiation failed");
        self.store.mark_failed(call_id, &detail, Utc::now()).await?;
        Err(InitiateError::Provider { call_id, detail })
    }
}

#[async_trait]
impl CallInitiator for ProviderCallInitiator {
    fn kind(&self) -> &'static str {
        "provider"
    }

    async fn initiate(&self, request: &CallRequest) -> Result<CallRecord, InitiateError> {
        let prepared = prepare(self.store.as_ref(), request, Utc::now()).await?;
        let call_id = prepared.record.id;
        let script = conversation_script(&request.label, &prepared.tasks);

        let body = OutboundCall {
            contact_address: &prepared.contact_address,
            script_text: &script,
            language: LANGUAGE,
            temperature: TEMPERATURE,
            max_duration_seconds: MAX_DURATION_SECONDS,
            callback_url: &self.callback_url,
            voice: self.config.voice.as_deref(),
            model: self.config.model.as_deref(),
        };

        let response = match self
            .http
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let detail = serde_json::json!({ "transport_error": e.to_string() }).to_string();
                return self.fail(call_id, detail).await;
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let detail = serde_json::json!({
                    "http_status": status.as_u16(),
                    "transport_error": e.to_string(),
                })
                .to_string();
                return self.fail(call_id, detail).await;
            }
        };

        if !status.is_success() {
            // The provider's error payload is kept byte for byte, JSON or not.
            let detail = serde_json::json!({
                "http_status": status.as_u16(),
                "body": text,
            })
            .to_string();
            return self.fail(call_id, detail).await;
        }

        let provider_call_id = serde_json::from_str::<AcceptedCall>(&text)
            .ok()
            .and_then(|accepted| accepted.call_id)
            .filter(|id| !id.trim().is_empty());
        if provider_call_id.is_none() {
            tracing::warn!(%call_id, "Provider accepted call without a call id; webhooks will need fallback matching");
        }

        self.store
            .mark_initiated(call_id, provider_call_id.as_deref(), Utc::now())
            .await?;
        tracing::info!(
            %call_id,
            user_id = %request.user_id,
            schedule_id = ?request.schedule_id,
            provider_call_id = ?provider_call_id,
            "Call initiated"
        );
        Ok(refreshed(self.store.as_ref(), prepared.record).await?)
    }
}
