//! The request dispatcher.
//!
//! Every request runs the same fixed sequence of stages and stops at the
//! first failure:
//!
//! ```text
//! IdentityResolution → Authorization → Binding → Handling → ResponseWriting
//! ```
//!
//! | Stage | Purpose                                                    |
//! |-------|------------------------------------------------------------|
//! | 1     | Parse `Authorization`, load session and user               |
//! | 2     | Run the endpoint guard's predicate                         |
//! | 3     | Read the body, build buckets, bind declared parameters     |
//! | 4     | Call the handler                                           |
//! | 5     | Render the handler's response or the error of any stage    |
//!
//! Stage 3 only reads the query string and body when the guard declares
//! a parameter type. Otherwise the handler sees just the `url` bucket.
//!
//! The request ID is generated before stage 1 and set on every response.
//! A panic in any stage is caught and rendered as an `Internal` error.

use crate::config::DispatcherConfig;
use crate::context::{ContextParts, RequestContext};
use crate::credentials::{parse_authorization, Credentials, AUTHORIZATION_FIELD};
use crate::handler::Endpoint;
use crate::response::{render_error, ResponseSink};
use crate::types::{json_response, Request, Response};
use bytes::Bytes;
use futures_util::FutureExt;
use http::header::CONTENT_LENGTH;
use http::request::Parts;
use http::{HeaderName, StatusCode};
use http_body_util::{BodyExt, Full};
use keystone_bind::{MultipartConfig, RequestBuckets};
use keystone_core::{
    AppError, AppResult, ErrorKind, Identity, Mailer, ReportScope, Reporter, RequestId,
    SessionStore, TracingReporter,
};
use keystone_telemetry::{record_internal_error, record_request};
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span};

/// Dispatch stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DispatchStage {
    /// Stage 1: credentials to identity
    IdentityResolution = 1,
    /// Stage 2: guard predicate
    Authorization = 2,
    /// Stage 3: body, buckets and parameters
    Binding = 3,
    /// Stage 4: handler call
    Handling = 4,
    /// Stage 5: response rendering
    ResponseWriting = 5,
}

impl DispatchStage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IdentityResolution => "identity_resolution",
            Self::Authorization => "authorization",
            Self::Binding => "binding",
            Self::Handling => "handling",
            Self::ResponseWriting => "response_writing",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [DispatchStage; 5] {
        [
            Self::IdentityResolution,
            Self::Authorization,
            Self::Binding,
            Self::Handling,
            Self::ResponseWriting,
        ]
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::IdentityResolution,
            2 => Self::Authorization,
            3 => Self::Binding,
            4 => Self::Handling,
            _ => Self::ResponseWriting,
        }
    }
}

impl std::fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Current stage, readable after a panic unwound the stage future.
struct StageCell(AtomicU8);

impl StageCell {
    fn new() -> Self {
        Self(AtomicU8::new(DispatchStage::IdentityResolution as u8))
    }

    fn enter(&self, stage: DispatchStage) {
        tracing::trace!(stage = stage.name(), "entering stage");
        self.0.store(stage as u8, Ordering::Relaxed);
    }

    fn get(&self) -> DispatchStage {
        DispatchStage::from_u8(self.0.load(Ordering::Relaxed))
    }
}

/// Per-request state shared by the stages and the final response writer.
struct InFlight {
    request_id: RequestId,
    span: Span,
    stage: StageCell,
    sink: ResponseSink,
    report: Arc<Mutex<ReportScope>>,
}

/// Runs endpoints.
///
/// Built once at startup with its collaborators and shared by all requests.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::builder(Arc::new(MemorySessionStore::new()))
///     .config(config.dispatcher)
///     .multipart(config.multipart)
///     .build();
///
/// let response = dispatcher.dispatch(&endpoint, request, [("id", id)]).await;
/// ```
pub struct Dispatcher {
    config: DispatcherConfig,
    multipart: MultipartConfig,
    request_id_header: HeaderName,
    sessions: Arc<dyn SessionStore>,
    reporter: Arc<dyn Reporter>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl Dispatcher {
    /// Creates a builder around the session store.
    #[must_use]
    pub fn builder(sessions: Arc<dyn SessionStore>) -> DispatcherBuilder {
        DispatcherBuilder::new(sessions)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatches one request to `endpoint`.
    ///
    /// `path_params` are the router's path variables; they fill the `url`
    /// bucket. Always returns a response.
    pub async fn dispatch<I, K, V>(&self, endpoint: &Endpoint, request: Request, path_params: I) -> Response
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request_id = RequestId::new();
        let started = Instant::now();
        let path_params: Vec<(String, String)> = path_params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = request.uri().path(),
            endpoint = endpoint.name(),
            user_id = tracing::field::Empty,
        );
        let mut scope = ReportScope::new(Arc::clone(&self.reporter), request_id);
        scope.add_tag("endpoint", endpoint.name());
        let state = InFlight {
            request_id,
            span,
            stage: StageCell::new(),
            sink: ResponseSink::new(),
            report: Arc::new(Mutex::new(scope)),
        };

        let outcome = AssertUnwindSafe(self.run(endpoint, request, path_params, &state))
            .catch_unwind()
            .instrument(state.span.clone())
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(self.recover(payload.as_ref(), &state)),
        };

        let mut response = match result {
            Ok(()) => {
                state.stage.enter(DispatchStage::ResponseWriting);
                state
                    .sink
                    .take()
                    .unwrap_or_else(|| json_response(StatusCode::OK, Bytes::new()))
            }
            Err(err) => {
                if state.sink.take().is_some() {
                    tracing::debug!(parent: &state.span, "discarding handler response in favour of error");
                }
                self.write_error(&err, &state)
            }
        };
        response
            .headers_mut()
            .insert(self.request_id_header.clone(), request_id.header_value());

        let stage = state.stage.get();
        let status = response.status().as_u16();
        let elapsed = started.elapsed();
        tracing::info!(
            parent: &state.span,
            stage = stage.name(),
            status,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "request dispatched"
        );
        record_request(stage.name(), status, elapsed);
        response
    }

    /// Dispatches like [`dispatch`](Self::dispatch) but gives up as soon as
    /// `cancelled` completes, e.g. when the client connection is gone.
    ///
    /// Returns `None` when cancelled; nothing is rendered in that case.
    pub async fn dispatch_until<I, K, V, C>(
        &self,
        endpoint: &Endpoint,
        request: Request,
        path_params: I,
        cancelled: C,
    ) -> Option<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancelled => {
                tracing::debug!(endpoint = endpoint.name(), "request cancelled, no response written");
                None
            }
            response = self.dispatch(endpoint, request, path_params) => Some(response),
        }
    }

    async fn run(
        &self,
        endpoint: &Endpoint,
        request: Request,
        path_params: Vec<(String, String)>,
        state: &InFlight,
    ) -> AppResult<()> {
        let (parts, body) = request.into_parts();

        state.stage.enter(DispatchStage::IdentityResolution);
        let credentials = parse_authorization(&parts.headers, &self.config.realm)?;
        let identity = self.resolve_identity(credentials.as_ref()).await?;
        if let Some(user_id) = identity.user_id() {
            state.span.record("user_id", user_id);
            state.report.lock().set_user(user_id);
        }

        state.stage.enter(DispatchStage::Authorization);
        let guard = endpoint.guard();
        if let Some(guard) = guard {
            guard.authorize(&identity)?;
        }

        state.stage.enter(DispatchStage::Binding);
        let (buckets, params) = match guard.filter(|guard| guard.has_params()) {
            Some(guard) => {
                let body = self.read_body(&parts, body).await?;
                let buckets =
                    RequestBuckets::from_request(&parts, body, path_params, &self.multipart).await?;
                let params = guard.bind(&buckets)?;
                (buckets, params)
            }
            None => (RequestBuckets::from_path(path_params), None),
        };

        state.stage.enter(DispatchStage::Handling);
        let ctx = RequestContext::new(ContextParts {
            request_id: state.request_id,
            method: parts.method,
            uri: parts.uri,
            identity: Arc::new(identity),
            credentials,
            buckets,
            params,
            span: state.span.clone(),
            report: Arc::clone(&state.report),
            response: state.sink.clone(),
        });
        endpoint.handler().call(ctx).await
    }

    async fn resolve_identity(&self, credentials: Option<&Credentials>) -> AppResult<Identity> {
        let Some(Credentials::Session {
            user_id,
            session_id,
        }) = credentials
        else {
            return Ok(Identity::anonymous());
        };

        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .filter(|session| session.user_id == *user_id)
            .ok_or_else(|| AppError::not_found("session not found").with_field(AUTHORIZATION_FIELD))?;
        let user = self
            .sessions
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found").with_field(AUTHORIZATION_FIELD))?;
        Ok(Identity::new(user, session))
    }

    async fn read_body(&self, parts: &Parts, body: Full<Bytes>) -> AppResult<Bytes> {
        let limit = self.config.max_body_size;
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(body_too_large(limit));
        }

        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        if bytes.len() > limit {
            return Err(body_too_large(limit));
        }
        Ok(bytes)
    }

    fn recover(&self, payload: &(dyn Any + Send), state: &InFlight) -> AppError {
        let stage = state.stage.get();
        let message = panic_message(payload);
        tracing::error!(parent: &state.span, stage = stage.name(), panic = %message, "recovered from panic");

        if let Some(mailer) = &self.mailer {
            let mailer = Arc::clone(mailer);
            let subject = format!("panic in {stage} stage of request {}", state.request_id);
            let trace = message.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.send_stack_trace(&subject, &trace).await {
                    tracing::warn!(error = %e, "failed to mail panic report");
                }
            });
        }
        AppError::internal(format!("panic: {message}"))
    }

    fn write_error(&self, err: &AppError, state: &InFlight) -> Response {
        let stage = state.stage.get();
        if err.is_internal() {
            tracing::error!(
                parent: &state.span,
                stage = stage.name(),
                error = %err.detailed(),
                "internal error"
            );
            record_internal_error(stage.name());
            if self.config.report_internal_errors {
                state.report.lock().report_error(err);
            }
        } else {
            tracing::debug!(
                parent: &state.span,
                stage = stage.name(),
                kind = %err.kind(),
                field = err.field(),
                error = %err,
                "request rejected"
            );
        }
        render_error(err, &self.config)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("multipart", &self.multipart)
            .field("mailer", &self.mailer.is_some())
            .finish_non_exhaustive()
    }
}

fn body_too_large(limit: usize) -> AppError {
    AppError::new(
        ErrorKind::InvalidArgument,
        format!("request body exceeds {limit} bytes"),
    )
}

/// Extracts a message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    multipart: MultipartConfig,
    sessions: Arc<dyn SessionStore>,
    reporter: Arc<dyn Reporter>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl DispatcherBuilder {
    /// Creates a builder with default configuration and a
    /// [`TracingReporter`].
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config: DispatcherConfig::default(),
            multipart: MultipartConfig::default(),
            sessions,
            reporter: Arc::new(TracingReporter),
            mailer: None,
        }
    }

    /// Sets the dispatcher configuration.
    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the multipart limits.
    #[must_use]
    pub fn multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    /// Sets the error reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets the mailer that receives panic reports.
    #[must_use]
    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Builds the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            request_id_header: self.config.request_id_header_name(),
            config: self.config,
            multipart: self.multipart,
            sessions: self.sessions,
            reporter: self.reporter,
            mailer: self.mailer,
        }
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("multipart", &self.multipart)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::Guard;
    use async_trait::async_trait;
    use keystone_bind::{FieldAnnotation, Params, SchemaBuilder};
    use keystone_core::{Mail, MemorySessionStore, Session, User};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn dispatcher() -> Dispatcher {
        let store = MemorySessionStore::new();
        store.insert_user(User::new("u1", "ada@example.com"));
        store.insert_session(Session::new("s1", "u1"));
        Dispatcher::builder(Arc::new(store)).build()
    }

    fn get(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const NO_PARAMS: [(&str, &str); 0] = [];

    async fn noop(_ctx: RequestContext) -> AppResult<()> {
        Ok(())
    }

    async fn slow(_ctx: RequestContext) -> AppResult<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    #[derive(Debug, Default)]
    struct Project {
        id: String,
    }

    fn project_id(p: &mut Project) -> &mut String {
        &mut p.id
    }

    impl Params for Project {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field(
                FieldAnnotation::new("url", "id").rules("required,uuid"),
                project_id,
            );
        }
    }

    /// An endpoint that counts its calls and echoes `Project.id` when the
    /// guard declared it.
    fn counting(calls: &Arc<AtomicUsize>) -> Endpoint {
        let counter = Arc::clone(calls);
        Endpoint::new("counting", move |ctx: RequestContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match ctx.params::<Project>() {
                    Ok(project) => ctx.response().ok(&project.id),
                    Err(_) => Ok(()),
                }
            }
        })
    }

    fn json_post(uri: &str, body: &'static [u8]) -> Request {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(body)))
            .unwrap()
    }

    #[test]
    fn test_stage_order() {
        let stages = DispatchStage::all();
        assert_eq!(stages.len(), 5);
        assert_eq!(stages[0].name(), "identity_resolution");
        assert_eq!(stages[4].name(), "response_writing");
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        for stage in stages {
            assert_eq!(DispatchStage::from_u8(stage as u8), stage);
        }
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[tokio::test]
    async fn test_success_without_body() {
        let endpoint = Endpoint::new("noop", noop);
        let response = dispatcher().dispatch(&endpoint, get("/noop"), NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_handler_renders_body() {
        let endpoint = Endpoint::new("create", |ctx: RequestContext| async move {
            ctx.response().created(&serde_json::json!({"id": "i1"}))
        });
        let response = dispatcher().dispatch(&endpoint, get("/create"), NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["id"], "i1");
    }

    #[tokio::test]
    async fn test_handler_error_replaces_rendered_response() {
        let endpoint = Endpoint::new("half", |ctx: RequestContext| async move {
            ctx.response().ok(&"partial")?;
            Err(AppError::already_exists("duplicate").with_field("email"))
        });
        let response = dispatcher().dispatch(&endpoint, get("/half"), NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json(response).await["field"], "email");
    }

    #[tokio::test]
    async fn test_session_identity_resolved() {
        let endpoint = Endpoint::new("me", |ctx: RequestContext| async move {
            ctx.response().ok(&ctx.identity().user_id())
        })
        .with_guard(Guard::authenticated());

        let mut request = get("/me");
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            Credentials::session("u1", "s1").to_header_value(None),
        );
        let response = dispatcher().dispatch(&endpoint, request, NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!("u1"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let endpoint = Endpoint::new("me", noop);
        let mut request = get("/me");
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            Credentials::session("u1", "gone").to_header_value(None),
        );
        let response = dispatcher().dispatch(&endpoint, request, NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["field"], AUTHORIZATION_FIELD);
    }

    #[tokio::test]
    async fn test_session_of_other_user_is_not_found() {
        let endpoint = Endpoint::new("me", noop);
        let mut request = get("/me");
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            Credentials::session("u2", "s1").to_header_value(None),
        );
        let response = dispatcher().dispatch(&endpoint, request, NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guard_denial_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let endpoint = Endpoint::new("admin", move |_ctx: RequestContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(())
            }
        })
        .with_guard(Guard::admin());

        let response = dispatcher().dispatch(&endpoint, get("/admin"), NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let store = Arc::new(MemorySessionStore::new());
        let dispatcher = Dispatcher::builder(store)
            .config(DispatcherConfig {
                max_body_size: 4,
                ..DispatcherConfig::default()
            })
            .build();
        let endpoint =
            Endpoint::new("upload", noop).with_guard(Guard::new().with_params::<Project>());
        let request = json_post("/upload", b"{\"a\": 1}");

        let response = dispatcher
            .dispatch(&endpoint, request, [("id", "0190b2a4-7c5e-7def-8a3b-5f1e2d3c4b5a")])
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["error"], "request body exceeds 4 bytes");
        assert!(body.get("field").is_none());
    }

    #[tokio::test]
    async fn test_body_ignored_without_declared_params() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = counting(&calls);
        let response = dispatcher()
            .dispatch(&endpoint, json_post("/ping?broken=%zz", b"{not json"), NO_PARAMS)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let endpoint = counting(&calls).with_guard(Guard::new());
        let response = dispatcher()
            .dispatch(&endpoint, json_post("/ping", b"{not json"), NO_PARAMS)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_with_declared_params() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = counting(&calls).with_guard(Guard::new().with_params::<Project>());
        let response = dispatcher()
            .dispatch(
                &endpoint,
                json_post("/projects", b"{not json"),
                [("id", "0190b2a4-7c5e-7def-8a3b-5f1e2d3c4b5a")],
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = counting(&calls).with_guard(Guard::new().with_params::<Project>());

        let response = dispatcher()
            .dispatch(&endpoint, get("/projects/42"), [("id", "42")])
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(response).await,
            serde_json::json!({"error": "id must be a valid uuid", "field": "id"})
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let id = "0190b2a4-7c5e-7def-8a3b-5f1e2d3c4b5a";
        let response = dispatcher()
            .dispatch(&endpoint, get("/projects/x"), [("id", id)])
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await, serde_json::json!(id));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_credentials_rejected_before_guard() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = counting(&calls).with_guard(Guard::authenticated());

        for value in ["basic", "Basic", "basic dTE6czE= garbage"] {
            let mut request = get("/me");
            request.headers_mut().insert(
                http::header::AUTHORIZATION,
                http::HeaderValue::from_static(value),
            );
            let response = dispatcher().dispatch(&endpoint, request, NO_PARAMS).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{value}");
            assert_eq!(json(response).await["field"], AUTHORIZATION_FIELD);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        struct Recorder(Mutex<Vec<String>>);

        #[async_trait]
        impl Mailer for Recorder {
            async fn send(&self, _mail: Mail) -> AppResult<()> {
                Ok(())
            }

            async fn send_stack_trace(&self, _subject: &str, trace: &str) -> AppResult<()> {
                self.0.lock().push(trace.to_string());
                Ok(())
            }
        }

        let mailer = Arc::new(Recorder(Mutex::new(Vec::new())));
        let dispatcher = Dispatcher::builder(Arc::new(MemorySessionStore::new()))
            .mailer(Arc::clone(&mailer) as Arc<dyn Mailer>)
            .build();
        async fn boom(ctx: RequestContext) -> AppResult<()> {
            if ctx.params::<u32>().is_err() {
                panic!("index out of range");
            }
            Ok(())
        }
        let endpoint = Endpoint::new("boom", boom);

        let response = dispatcher.dispatch(&endpoint, get("/boom"), NO_PARAMS).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            json(response).await,
            serde_json::json!({"error": "internal server error"})
        );

        for _ in 0..50 {
            if !mailer.0.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mailer.0.lock().as_slice(), ["index out of range".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_until_cancelled() {
        let endpoint = Endpoint::new("slow", slow);
        let response = dispatcher()
            .dispatch_until(&endpoint, get("/slow"), NO_PARAMS, std::future::ready(()))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_until_completes() {
        let endpoint = Endpoint::new("fast", noop);
        let response = dispatcher()
            .dispatch_until(&endpoint, get("/fast"), NO_PARAMS, std::future::pending())
            .await;
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_request_id_header() {
        let dispatcher = Dispatcher::builder(Arc::new(MemorySessionStore::new()))
            .config(DispatcherConfig {
                request_id_header: "x-correlation-id".to_string(),
                ..DispatcherConfig::default()
            })
            .build();
        let endpoint = Endpoint::new("noop", noop);
        let response = dispatcher.dispatch(&endpoint, get("/"), NO_PARAMS).await;
        let id = response.headers().get("x-correlation-id").unwrap();
        assert!(RequestId::parse(id.to_str().unwrap()).is_ok());
    }
}
