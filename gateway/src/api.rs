use crate::auth::require_bearer;
use crate::completion::CompletionClient;
use crate::config::allows_any_origin;
use crate::errors::{ApiError, GatewayError};
use crate::{SERVICE_NAME, SERVICE_VERSION};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::{SecondsFormat, Utc};
use forwarder::{DeliverySummary, Payload, WebhookForwarder};
use http::{HeaderMap, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const QUERY_ROUTE: &str = "/query";
pub const REMINDER_ROUTE: &str = "/reminder";
pub const QUERY_EVENT: &str = "consulta";
pub const REMINDER_EVENT: &str = "recordatorio";

/// Request headers echoed back by the `/test` route.
const ECHOED_HEADERS: &[&str] = &["content-type", "authorization", "user-agent"];

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    completion: Arc<dyn CompletionClient>,
    forwarder: Option<WebhookForwarder>,
    bearer_token: String,
    environment: String,
}

impl AppState {
    /// `forwarder` is `None` when no webhook is configured for `environment`;
    /// routes then skip the webhook call.
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        forwarder: Option<WebhookForwarder>,
        bearer_token: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                completion,
                forwarder,
                bearer_token: bearer_token.into(),
                environment: environment.into(),
            }),
        }
    }

    pub fn bearer_token(&self) -> &str {
        &self.inner.bearer_token
    }

    /// Forwards `data` if a webhook is configured. The outcome is already
    /// logged by the forwarder and is only informational here.
    async fn notify(&self, data: &Payload, origin: &str) -> Option<DeliverySummary> {
        match &self.inner.forwarder {
            Some(forwarder) => Some(forwarder.send(data, origin).await.summary()),
            None => {
                tracing::warn!(
                    origin,
                    environment = %self.inner.environment,
                    "Skipping webhook call: no webhook configured for this environment"
                );
                None
            }
        }
    }
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Result<Router, GatewayError> {
    let protected = Router::new()
        .route(QUERY_ROUTE, post(query))
        .route(REMINDER_ROUTE, post(reminder))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Ok(Router::new()
        .route("/", get(info))
        .route("/healthz", get(healthz))
        .route("/test", post(echo))
        .merge(protected)
        .layer(cors_layer(allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, GatewayError> {
    let allow_origin = if allows_any_origin(allowed_origins) {
        AllowOrigin::from(Any)
    } else {
        let origins = allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| GatewayError::InvalidOrigin(origin.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "timestamp": now_rfc3339(),
    }))
}

async fn info(State(state): State<AppState>) -> Json<Value> {
    let webhook_url = state
        .inner
        .forwarder
        .as_ref()
        .map(|forwarder| forwarder.webhook_url().to_string());

    Json(json!({
        "status": "online",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "model": state.inner.completion.model(),
        "environment": state.inner.environment,
        "n8n_webhook_configured": webhook_url.is_some(),
        "n8n_webhook_url": webhook_url.unwrap_or_else(|| "Not configured".to_string()),
    }))
}

/// Echoes the parsed body and a few headers, to debug client integrations.
async fn echo(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers_echo: serde_json::Map<String, Value> = ECHOED_HEADERS
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .map(|value| (name.to_string(), json!(String::from_utf8_lossy(value.as_bytes()))))
        })
        .collect();

    match serde_json::from_slice::<Value>(&body) {
        Ok(parsed) => {
            tracing::info!(body = %parsed, "Echo request");
            Json(json!({
                "success": true,
                "received_body": parsed,
                "received_headers": headers_echo,
                "message": "JSON and headers parsed correctly",
            }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Echo request with invalid JSON");
            Json(json!({
                "success": false,
                "error": e.to_string(),
                "headers_echo": headers_echo,
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryIn {
    pub pregunta: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryOut {
    pub respuesta: String,
}

/// Link that opens WhatsApp with the answer pre-filled.
pub fn whatsapp_link(text: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(text.as_bytes()).collect();
    format!("https://wa.me/?text={encoded}")
}

async fn query(
    State(state): State<AppState>,
    Json(input): Json<QueryIn>,
) -> Result<Json<QueryOut>, ApiError> {
    tracing::info!(pregunta = %input.pregunta, "New query");

    let respuesta = match state.inner.completion.complete(&input.pregunta).await {
        Ok(respuesta) => respuesta,
        Err(e) => {
            tracing::error!(error = ?e, model = state.inner.completion.model(), "Completion failed");
            return Err(e.into());
        }
    };

    // Only successful answers are forwarded. The outcome never changes the response.
    let data = Payload::event(QUERY_EVENT, Utc::now())
        .with("pregunta", input.pregunta.as_str())
        .with("respuesta_groq", respuesta.as_str())
        .with("whatsapp_link", whatsapp_link(&respuesta));
    state.notify(&data, QUERY_ROUTE).await;

    tracing::info!("Query completed");
    Ok(Json(QueryOut { respuesta }))
}

#[derive(Debug, Deserialize)]
pub struct ReminderIn {
    pub text: String,
    pub task_id: String,
    pub due_date: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub response_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReminderOut {
    pub status: &'static str,
    /// Informational only: delivery problems never fail the request.
    pub webhook: Option<DeliverySummary>,
}

async fn reminder(
    State(state): State<AppState>,
    Json(input): Json<ReminderIn>,
) -> Result<Json<ReminderOut>, ApiError> {
    if input.text.trim().is_empty() {
        return Err(ApiError::InvalidRequest("text cannot be empty".into()));
    }
    if input.task_id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("task_id cannot be empty".into()));
    }
    tracing::info!(task_id = %input.task_id, "New reminder");

    let data = Payload::event(REMINDER_EVENT, Utc::now())
        .with("text", input.text)
        .with("task_id", input.task_id)
        .with("due_date", input.due_date)
        .with("priority", input.priority)
        .with("type", input.kind)
        .with("response_mode", input.response_mode);
    let webhook = state.notify(&data, REMINDER_ROUTE).await;

    Ok(Json(ReminderOut {
        status: "received",
        webhook,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, OpenAiCompatibleClient};
    use crate::config::CompletionConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use forwarder::ForwarderConfig;
    use forwarder::config::Timeouts;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const TOKEN: &str = "secret";

    struct FixedCompletion(Result<&'static str, u16>);

    #[async_trait]
    impl CompletionClient for FixedCompletion {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, _question: &str) -> Result<String, CompletionError> {
            match self.0 {
                Ok(answer) => Ok(answer.to_string()),
                Err(status) => Err(CompletionError::Status {
                    status,
                    body: "upstream down".into(),
                }),
            }
        }
    }

    type Received = Arc<Mutex<Vec<Value>>>;

    /// Local webhook recording JSON bodies and answering with `status`.
    async fn spawn_webhook(status: StatusCode) -> (WebhookForwarder, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let recorder = received.clone();
        let app = Router::new().route(
            "/webhook",
            post(move |Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().await.push(body);
                    (status, Json(json!({"status": "received"}))).into_response()
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = url::Url::parse(&format!("http://{addr}/webhook")).unwrap();
        let forwarder = WebhookForwarder::new(ForwarderConfig::new(url, "test")).unwrap();
        (forwarder, received)
    }

    /// A forwarder whose webhook refuses connections.
    async fn unreachable_forwarder() -> WebhookForwarder {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = url::Url::parse(&format!("http://{addr}/webhook")).unwrap();
        let config = ForwarderConfig::new(url, "prod").with_timeouts(Timeouts {
            overall_secs: 1,
            connect_secs: 1,
        });
        WebhookForwarder::new(config).unwrap()
    }

    fn app(completion: FixedCompletion, forwarder: Option<WebhookForwarder>) -> Router {
        let state = AppState::new(Arc::new(completion), forwarder, TOKEN, "test");
        router(state, &["*".to_string()]).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_and_info() {
        let app = app(FixedCompletion(Ok("hola")), None);

        let response = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_NAME);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["environment"], "test");
        assert_eq!(body["n8n_webhook_configured"], false);
        assert_eq!(body["n8n_webhook_url"], "Not configured");
    }

    #[tokio::test]
    async fn test_query_requires_bearer_token() {
        let app = app(FixedCompletion(Ok("hola")), None);

        let response = app
            .clone()
            .oneshot(post_json("/query", None, json!({"pregunta": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
        assert_eq!(body_json(response).await["detail"], "Authentication required");

        let response = app
            .oneshot(post_json("/query", Some("wrong"), json!({"pregunta": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
    }

    #[tokio::test]
    async fn test_query_forwards_answer() {
        let (forwarder, received) = spawn_webhook(StatusCode::OK).await;
        let app = app(FixedCompletion(Ok("Gastaste 10 euros")), Some(forwarder));

        let response = app
            .oneshot(post_json("/query", Some(TOKEN), json!({"pregunta": "¿Cuánto?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"respuesta": "Gastaste 10 euros"})
        );

        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        let sent = &received[0];
        assert_eq!(sent["evento"], QUERY_EVENT);
        assert_eq!(sent["pregunta"], "¿Cuánto?");
        assert_eq!(sent["respuesta_groq"], "Gastaste 10 euros");
        assert_eq!(sent["whatsapp_link"], "https://wa.me/?text=Gastaste+10+euros");
        assert_eq!(sent["origin_endpoint"], QUERY_ROUTE);
        assert_eq!(sent["environment"], "test");
        assert!(sent["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_query_succeeds_when_webhook_is_down() {
        let app = app(FixedCompletion(Ok("hola")), Some(unreachable_forwarder().await));

        let response = app
            .oneshot(post_json("/query", Some(TOKEN), json!({"pregunta": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"respuesta": "hola"}));
    }

    #[tokio::test]
    async fn test_query_completion_failure_is_bad_gateway() {
        let (forwarder, received) = spawn_webhook(StatusCode::OK).await;
        let app = app(FixedCompletion(Err(503)), Some(forwarder));

        let response = app
            .oneshot(post_json("/query", Some(TOKEN), json!({"pregunta": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Completion error"));
        // Nothing is forwarded without an answer.
        assert!(received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_query_stalled_completion_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let completion = OpenAiCompatibleClient::new(CompletionConfig {
            base_url: url::Url::parse(&format!("http://{addr}/v1")).unwrap(),
            api_key: "gsk_test".into(),
            timeout_secs: 1,
            connect_timeout_secs: 1,
            ..CompletionConfig::default()
        })
        .unwrap();
        let state = AppState::new(Arc::new(completion), None, TOKEN, "test");
        let app = router(state, &["*".to_string()]).unwrap();

        let response = app
            .oneshot(post_json("/query", Some(TOKEN), json!({"pregunta": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_reminder_forwards_and_reports_outcome() {
        let (forwarder, received) = spawn_webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let app = app(FixedCompletion(Ok("unused")), Some(forwarder));

        let response = app
            .oneshot(post_json(
                "/reminder",
                Some(TOKEN),
                json!({
                    "text": "Pagar la luz",
                    "task_id": "t-1",
                    "due_date": "2025-07-01",
                    "priority": "high",
                    "type": "bill",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "received");
        assert_eq!(body["webhook"]["outcome"], "delivered");
        assert_eq!(body["webhook"]["status"], 500);

        let received = received.lock().await;
        let sent = &received[0];
        assert_eq!(sent["evento"], REMINDER_EVENT);
        assert_eq!(sent["text"], "Pagar la luz");
        assert_eq!(sent["task_id"], "t-1");
        assert_eq!(sent["type"], "bill");
        assert_eq!(sent["response_mode"], Value::Null);
        assert_eq!(sent["origin_endpoint"], REMINDER_ROUTE);
    }

    #[tokio::test]
    async fn test_reminder_without_webhook_and_validation() {
        let app = app(FixedCompletion(Ok("unused")), None);

        let response = app
            .clone()
            .oneshot(post_json(
                "/reminder",
                Some(TOKEN),
                json!({"text": "Llamar", "task_id": "t-2"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "received", "webhook": null})
        );

        let response = app
            .oneshot(post_json(
                "/reminder",
                Some(TOKEN),
                json!({"text": "  ", "task_id": "t-3"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_echo() {
        let app = app(FixedCompletion(Ok("unused")), None);

        let response = app
            .clone()
            .oneshot(post_json("/test", Some(TOKEN), json!({"a": 1})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["received_body"], json!({"a": 1}));
        assert_eq!(body["received_headers"]["authorization"], "Bearer secret");
        assert_eq!(body["received_headers"]["content-type"], "application/json");

        let request = Request::post("/test").body(Body::from("{not json")).unwrap();
        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[test]
    fn test_whatsapp_link_encoding() {
        assert_eq!(
            whatsapp_link("Total: 5€ & más"),
            "https://wa.me/?text=Total%3A+5%E2%82%AC+%26+m%C3%A1s"
        );
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        let state = AppState::new(Arc::new(FixedCompletion(Ok("x"))), None, TOKEN, "prod");
        assert!(matches!(
            router(state, &["bad\norigin".to_string()]),
            Err(GatewayError::InvalidOrigin(_))
        ));
    }
}
