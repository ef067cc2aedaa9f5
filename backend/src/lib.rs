//! # Expense Tracker Backend
//!
//! Everything except the UI: monthly income and expense records, yearly
//! charts, accounts with an admin approval gate, and the account settings
//! flow.
//!
//! ```text
//! HTTP clients
//!     ↓
//! io::rest     (axum handlers, JSON)
//!     ↓
//! domain       (services, flows, pure computations)
//!     ↓
//! storage      (CSV files, identity store, live queries)
//! ```

pub mod config;
pub mod domain;
pub mod io;
pub mod storage;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use shared::{Notification, RecordKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::{AccountFlow, AppContext, AuthService, RecordForm, RecordService};
use crate::io::FeedRegistry;
use crate::storage::{CsvConnection, LocalIdentityProvider, SessionStore};

type FormKey = (String, RecordKind);

/// Account settings flow of one user. Intents of the same user run one
/// at a time; different users never wait on each other.
pub type SharedAccountFlow = Arc<tokio::sync::Mutex<AccountFlow<CsvConnection, LocalIdentityProvider>>>;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub connection: Arc<CsvConnection>,
    pub identity: Arc<LocalIdentityProvider>,
    pub record_service: RecordService<CsvConnection>,
    pub auth_service: AuthService<CsvConnection, LocalIdentityProvider>,
    pub sessions: Arc<SessionStore>,
    /// Live record feeds, one per session token
    pub feeds: Arc<FeedRegistry>,
    /// One form per owner and record kind, so the in-flight guard is per user
    pub record_forms: Arc<Mutex<HashMap<FormKey, RecordForm<CsvConnection>>>>,
    pub account_flows: Arc<Mutex<HashMap<String, SharedAccountFlow>>>,
    pub app_context: Arc<tokio::sync::Mutex<AppContext<CsvConnection>>>,
    pub notification_ttl_ms: u64,
}

impl AppState {
    /// The form of `owner_id` for `kind`, created on first use
    pub fn record_form(&self, owner_id: &str, kind: RecordKind) -> RecordForm<CsvConnection> {
        let mut forms = self.record_forms.lock().unwrap_or_else(PoisonError::into_inner);
        forms
            .entry((owner_id.to_string(), kind))
            .or_insert_with(|| {
                RecordForm::new(kind, self.record_service.clone()).with_notification_ttl(self.notification_ttl_ms)
            })
            .clone()
    }

    pub fn account_flow(&self, uid: &str) -> Option<SharedAccountFlow> {
        self.flows().get(uid).cloned()
    }

    /// Keep `flow` for `uid` unless another request stored one first; the
    /// stored flow is returned either way
    pub fn insert_account_flow(
        &self,
        uid: &str,
        flow: AccountFlow<CsvConnection, LocalIdentityProvider>,
    ) -> SharedAccountFlow {
        Arc::clone(
            self.flows()
                .entry(uid.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(flow))),
        )
    }

    pub fn remove_account_flow(&self, uid: &str) -> Option<SharedAccountFlow> {
        self.flows().remove(uid)
    }

    fn flows(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedAccountFlow>> {
        self.account_flows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the configured auto-dismiss delay
    pub fn dismissible(&self, notification: Notification) -> Notification {
        notification.with_dismiss_after(self.notification_ttl_ms)
    }
}

/// Wire services over an existing connection
pub async fn build_state(connection: CsvConnection, config: &AppConfig) -> AppState {
    let identity = Arc::new(LocalIdentityProvider::new(
        connection.clone(),
        config.recent_login_window(),
    ));
    let app_context = AppContext::init(&connection).await;
    let auth_service = AuthService::new(&connection, Arc::clone(&identity), config.auto_approve_signups);
    let connection = Arc::new(connection);

    AppState {
        record_service: RecordService::new(Arc::clone(&connection)),
        auth_service,
        identity,
        connection,
        sessions: Arc::new(SessionStore::new(config.session_ttl())),
        feeds: Arc::new(FeedRegistry::default()),
        record_forms: Arc::new(Mutex::new(HashMap::new())),
        account_flows: Arc::new(Mutex::new(HashMap::new())),
        app_context: Arc::new(tokio::sync::Mutex::new(app_context)),
        notification_ttl_ms: config.notification_ttl_ms,
    }
}

/// Open the data directory and set up all services
pub async fn initialize_backend(config: &AppConfig) -> Result<AppState> {
    info!("Setting up storage in {:?}", config.data_directory);
    let connection = CsvConnection::new(&config.data_directory)
        .with_context(|| format!("opening data directory {:?}", config.data_directory))?;

    info!("Setting up domain services");
    Ok(build_state(connection, config).await)
}

/// Create the axum router with every route under `/api`
pub fn create_router(app_state: AppState, config: &AppConfig) -> Result<Router> {
    let origin = config
        .allowed_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid allowed_origin {:?}", config.allowed_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/auth/signup", post(io::sign_up))
        .route("/auth/signin", post(io::sign_in))
        .route("/auth/signout", post(io::sign_out))
        .route(
            "/users/:owner_id/records",
            get(io::list_records)
                .post(io::create_record)
                .delete(io::delete_period_records),
        )
        .route("/users/:owner_id/chart", get(io::get_year_chart))
        .route("/users/:owner_id/account", post(io::handle_account_intent))
        .route("/users/:owner_id/feed", get(io::open_record_feed))
        .route("/users/:owner_id/feed/period", put(io::select_feed_period))
        .route("/records/:id", delete(io::delete_record))
        .route("/records/:id/pin", put(io::set_record_pinned))
        .route("/preferences/theme", get(io::get_theme))
        .route("/preferences/theme/toggle", post(io::toggle_theme));

    Ok(Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(app_state))
}
