use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use tracing::warn;

use palco_core::domain::contact::normalize_subject_id;
use palco_core::SLOW_REPLY;
use palco_whatsapp::envelope::{InboundMessage, TwimlReply, WebhookForm};

use crate::bootstrap::ServerState;
use crate::health;

pub fn router(state: Arc<ServerState>) -> Router {
    let health_routes = health::router(state.db_pool.clone());

    Router::new()
        .route("/webhook/whatsapp", post(webhook))
        .route("/metrics", get(metrics))
        .route("/llm/status", get(llm_status))
        .route("/queue/status", get(queue_status))
        .route("/conversations/{subject}/status", get(conversation_status))
        .route("/conversations/{subject}/reset", post(conversation_reset))
        .with_state(state)
        .merge(health_routes)
}

/// Inbound webhook. Whatever happens inside, the transport gets a 200 with
/// a well-formed reply envelope; only a malformed payload is a 400.
async fn webhook(
    State(state): State<Arc<ServerState>>,
    Form(form): Form<WebhookForm>,
) -> Response {
    let inbound = match InboundMessage::from_form(form) {
        Ok(inbound) => inbound,
        Err(error) => return (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
    };

    let reply = process_inbound(&state, &inbound).await;
    xml_response(reply)
}

async fn process_inbound(state: &ServerState, inbound: &InboundMessage) -> String {
    if state.config.server.deferred_replies {
        let conversation = state.states.get(&inbound.subject_id).await;
        return state.queue.enqueue(
            &inbound.subject_id,
            &inbound.body,
            conversation.stage,
            &conversation.collected_fields,
        );
    }

    // Known subjects need little LLM work and get the short deadline; the
    // ceiling always stays under the platform's own webhook timeout.
    let known = matches!(state.profiles.find_by_contact(&inbound.subject_id).await, Ok(Some(_)));
    let deadline = Duration::from_secs(if known {
        state.config.server.known_subject_timeout_secs
    } else {
        state.config.server.new_subject_timeout_secs
    });

    match tokio::time::timeout(deadline, state.pipeline.respond(&inbound.subject_id, &inbound.body))
        .await
    {
        Ok(reply) => reply,
        Err(_) => {
            warn!(subject = %inbound.subject_id, deadline_secs = deadline.as_secs(),
                  "webhook processing outran its deadline");
            state.metrics.record_interaction(false);
            SLOW_REPLY.to_string()
        }
    }
}

fn xml_response(text: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        TwimlReply::new(text).to_xml(),
    )
        .into_response()
}

async fn metrics(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(json!({
        "daily": state.metrics.snapshot(),
        "queue": state.queue.stats(),
        "conversations_cached": state.states.cached_count(),
    }))
}

async fn llm_status(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let providers = state.provider_pool.status();
    let fallback_available = providers.iter().any(|provider| provider.available);
    Json(json!({
        "current_provider": state.provider_pool.first_available(),
        "providers": providers,
        "fallback_available": fallback_available,
    }))
}

async fn queue_status(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let stats = state.queue.stats();
    Json(json!({
        "status": if stats.running { "healthy" } else { "stopped" },
        "queue_stats": stats,
    }))
}

async fn conversation_status(
    State(state): State<Arc<ServerState>>,
    Path(subject): Path<String>,
) -> Json<serde_json::Value> {
    let subject_id = normalize_subject_id(&subject);
    let conversation = state.states.get(&subject_id).await;
    Json(json!({
        "subject": subject_id,
        "stage": conversation.stage.as_str(),
        "progress": conversation.progress(),
        "linked_profile": conversation.linked_profile_id.map(|id| id.to_string()),
    }))
}

async fn conversation_reset(
    State(state): State<Arc<ServerState>>,
    Path(subject): Path<String>,
) -> Json<serde_json::Value> {
    let subject_id = normalize_subject_id(&subject);
    let fresh = state.states.reset(&subject_id).await;
    Json(json!({
        "subject": subject_id,
        "status": "reiniciada",
        "stage": fresh.stage.as_str(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    use palco_agent::{DataExtractor, IntentAnalyzer, ProviderPool};
    use palco_core::config::AppConfig;
    use palco_core::metrics::BotMetrics;
    use palco_core::venue::{default_partner_directory, FixedCalendar};
    use palco_core::{FlowEngine, FlowLimits, StateManager};
    use palco_db::{connect_with_settings, InMemoryProfileRepository, InMemoryStateRepository};
    use palco_whatsapp::dispatch::DispatchQueue;
    use palco_whatsapp::transport::NoopTransport;

    use crate::bootstrap::{EnginePipeline, ServerState};

    use super::router;

    /// Offline runtime: in-memory stores, an empty provider pool (so every
    /// LLM operation takes its heuristic/fallback path) and a noop
    /// transport.
    async fn offline_state() -> Arc<ServerState> {
        let config = AppConfig::default();
        let db_pool =
            connect_with_settings("sqlite::memory:?cache=shared", 1, 5).await.expect("pool");

        let provider_pool = Arc::new(ProviderPool::with_clients(Vec::new()));
        let profiles = Arc::new(InMemoryProfileRepository::new());
        let states = Arc::new(StateManager::new(Arc::new(InMemoryStateRepository::new())));

        let engine = Arc::new(FlowEngine::new(
            Arc::new(IntentAnalyzer::new(provider_pool.clone(), config.venue.clone())),
            Arc::new(DataExtractor::new(provider_pool.clone(), config.venue.persona_name.clone())),
            profiles.clone(),
            Arc::new(FixedCalendar::with_defaults()),
            config.venue.clone(),
            default_partner_directory(),
            FlowLimits::default(),
        ));

        let metrics = Arc::new(BotMetrics::new());
        let pipeline = Arc::new(EnginePipeline::new(engine, states.clone(), metrics.clone()));
        let queue = Arc::new(DispatchQueue::start(
            config.queue.clone(),
            pipeline.clone(),
            Arc::new(NoopTransport::new()),
        ));

        Arc::new(ServerState {
            config,
            db_pool,
            profiles,
            states,
            pipeline,
            provider_pool,
            metrics,
            queue,
        })
    }

    fn webhook_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook/whatsapp")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn webhook_answers_first_contact_with_the_welcome_envelope() {
        let app = router(offline_state().await);

        let response = app
            .oneshot(webhook_request("From=whatsapp%3A%2B5511987654321&Body=oi"))
            .await
            .expect("handler runs");

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.contains("xml"));

        let body = body_string(response).await;
        assert!(body.contains("<Message>"));
        assert!(body.contains("Vamos cadastrar"));
    }

    #[tokio::test]
    async fn webhook_rejects_a_payload_without_body() {
        let app = router(offline_state().await);

        let response = app
            .oneshot(webhook_request("From=whatsapp%3A%2B5511987654321&Body="))
            .await
            .expect("handler runs");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_is_idempotent_through_the_route() {
        let state = offline_state().await;

        let first = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/conversations/+5511987654321/reset")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("handler runs");
        let second = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/conversations/+5511987654321/reset")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("handler runs");

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_string(first).await, body_string(second).await);
    }

    #[tokio::test]
    async fn operator_surfaces_report_queue_and_provider_state() {
        let state = offline_state().await;

        let queue_response = router(state.clone())
            .oneshot(
                Request::builder().uri("/queue/status").body(Body::empty()).expect("request"),
            )
            .await
            .expect("handler runs");
        assert_eq!(queue_response.status(), StatusCode::OK);
        assert!(body_string(queue_response).await.contains("\"status\":\"healthy\""));

        let llm_response = router(state)
            .oneshot(Request::builder().uri("/llm/status").body(Body::empty()).expect("request"))
            .await
            .expect("handler runs");
        assert_eq!(llm_response.status(), StatusCode::OK);
        assert!(body_string(llm_response).await.contains("fallback_available"));
    }
}
