//! # Authme - Identity Service
//!
//! Multi-tenant OpenID Connect identity provider. Each realm is an
//! isolated tenant with its own users, clients, roles, signing keys, and
//! policies.
//!
//! ## Architecture Overview
//!
//! This service follows **Clean Architecture** principles with clear
//! separation between layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                        │
//! │   protocol endpoints (JSON) + browser login flow (HTML)         │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                     Service Layer (service/)                    │
//! │   login state machine, OAuth grants, token factory, lifecycle   │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                  Repository Layer (repository/)                 │
//! │   realm-scoped queries, conditional updates for race safety     │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                      Domain Layer (domain/)                     │
//! │   realms, users, clients, sessions, tokens, credentials         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Interactive Login Control Flow
//!
//! ```text
//! /auth ─► realm context ─► credential verifier (+ brute-force guard)
//!       ─► password policy (expiry) ─► MFA engine ─► SSO session
//!       ─► consent ledger ─► authorization code ─► /token ─► token factory
//!       ─► session & refresh lifecycle
//! ```
//!
//! ## Background Work
//!
//! Three detachable workers keep slow or lossy work off the request path:
//! the event writer (drops on overflow), the mail dispatcher (drops on
//! overflow), and the backchannel logout deliverer (applies backpressure,
//! retries with exponential backoff).

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use shared::clock::{SharedClock, SystemClock};
use shared::config::AppConfig;
use shared::crypto::password::PasswordHasher;
use shared::crypto::SecretCipher;
use shared::errors::ApiError;
use shared::{database, tracing_config};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod api;
mod domain;
mod protocol;
mod repository;
mod service;

use api::routes;
use domain::Realm;
use repository::{
    ClientRepository, CodeRepository, ConsentRepository, DeviceRepository, EventRepository,
    GuardRepository, KeyRepository, MfaRepository, RealmRepository, RoleRepository,
    SessionRepository, UserRepository, VerificationRepository,
};
use service::sweeper::{self, SweeperDeps};
use service::{
    AccountService, AuthorizeService, BackchannelNotifier, BruteForceGuard, ConsentService,
    CredentialVerifier, DeviceService, EventRecorder, LogMailer, LoginSessionStore, MailDispatcher,
    MfaService, NoFederation, OAuthService, PasswordPolicyService, RealmCache, SessionLifecycle,
    TokenFactory, VerificationService,
};

/// Shared application state injected into all request handlers.
///
/// Services are composed once at startup by [`build_state`]; handlers
/// receive this via `web::Data<AppState>` and stay thin.
pub struct AppState {
    pub realm_cache: RealmCache,
    pub users: UserRepository,
    pub clients: ClientRepository,
    pub login_sessions: LoginSessionStore,
    pub credentials: CredentialVerifier,
    pub policy: PasswordPolicyService,
    pub mfa: MfaService,
    pub consent: ConsentService,
    pub authorize: AuthorizeService,
    pub oauth: OAuthService,
    pub lifecycle: SessionLifecycle,
    pub devices: DeviceService,
    pub accounts: AccountService,
    pub token_factory: TokenFactory,
    pub events: EventRecorder,
    pub clock: SharedClock,
    pub base_url: String,
    pub secure_cookies: bool,
}

impl AppState {
    /// Resolves a realm from its URL name.
    ///
    /// Every realm-scoped handler calls this first. Unknown realms are
    /// NotFound; disabled realms are Forbidden.
    pub async fn realm(&self, name: &str) -> Result<Arc<Realm>, ApiError> {
        let realm = self
            .realm_cache
            .realm_by_name(name)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("realm:{}", name),
            })?;

        if !realm.enabled {
            return Err(ApiError::Forbidden {
                reason: "realm is disabled".to_string(),
            });
        }

        Ok(realm)
    }
}

/// Composes every repository, worker, and service.
fn build_state(config: &AppConfig, pool: sqlx::PgPool) -> AppState {
    let clock: SharedClock = Arc::new(SystemClock);
    let hasher = Arc::new(PasswordHasher::new());
    let cipher = SecretCipher::new(&config.keys.master_key);

    // Repositories
    let realms = RealmRepository::new(pool.clone());
    let users = UserRepository::new(pool.clone());
    let clients = ClientRepository::new(pool.clone());
    let roles = RoleRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());
    let codes = CodeRepository::new(pool.clone());
    let devices_repo = DeviceRepository::new(pool.clone());
    let consents = ConsentRepository::new(pool.clone());
    let mfa_repo = MfaRepository::new(pool.clone());
    let guard_repo = GuardRepository::new(pool.clone());
    let keys_repo = KeyRepository::new(pool.clone());
    let verifications = VerificationRepository::new(pool.clone());
    let events_repo = EventRepository::new(pool.clone());

    // Background workers
    let (events, _events_handle) = EventRecorder::spawn(events_repo.clone(), clock.clone());
    let (backchannel, _backchannel_handle) = BackchannelNotifier::spawn(
        Duration::from_secs(config.outbound.timeout_seconds),
        config.outbound.max_attempts,
        events.clone(),
    );
    let (mail, _mail_handle) = MailDispatcher::spawn(Arc::new(LogMailer));

    // Services
    let realm_cache = RealmCache::new(realms, keys_repo);
    let guard = BruteForceGuard::new(guard_repo.clone(), events.clone(), clock.clone());
    let credentials = CredentialVerifier::new(
        users.clone(),
        hasher.clone(),
        guard,
        Arc::new(NoFederation),
        events.clone(),
        clock.clone(),
    );
    let policy = PasswordPolicyService::new(users.clone(), hasher.clone());
    let mfa = MfaService::new(mfa_repo.clone(), cipher, clock.clone());
    let login_sessions = LoginSessionStore::new(sessions.clone(), users.clone(), clock.clone());
    let consent = ConsentService::new(consents.clone(), clock.clone());
    let token_factory = TokenFactory::new(
        realm_cache.clone(),
        clients.clone(),
        roles,
        config.issuer.base_url.clone(),
        config.keys.master_key.clone(),
        clock.clone(),
    );
    let authorize = AuthorizeService::new(clients.clone(), codes.clone(), clock.clone());
    let lifecycle = SessionLifecycle::new(
        sessions.clone(),
        clients.clone(),
        token_factory.clone(),
        backchannel,
        events.clone(),
        clock.clone(),
    );
    let oauth = OAuthService::new(
        clients.clone(),
        users.clone(),
        sessions.clone(),
        codes.clone(),
        devices_repo.clone(),
        token_factory.clone(),
        credentials.clone(),
        events.clone(),
        clock.clone(),
    );
    let devices = DeviceService::new(
        clients.clone(),
        devices_repo.clone(),
        config.issuer.base_url.clone(),
        clock.clone(),
    );
    let verification = VerificationService::new(verifications.clone(), clock.clone());
    let accounts = AccountService::new(
        users.clone(),
        hasher,
        policy.clone(),
        verification,
        lifecycle.clone(),
        mail,
        events.clone(),
        config.issuer.base_url.clone(),
        clock.clone(),
    );

    // Periodic expiry sweep
    sweeper::spawn(
        SweeperDeps {
            codes,
            devices: devices_repo,
            consents,
            mfa: mfa_repo,
            verifications,
            sessions,
            guard: guard_repo,
            events: events_repo,
        },
        clock.clone(),
    );

    AppState {
        realm_cache,
        users,
        clients,
        login_sessions,
        credentials,
        policy,
        mfa,
        consent,
        authorize,
        oauth,
        lifecycle,
        devices,
        accounts,
        token_factory,
        events,
        clock,
        base_url: config.issuer.base_url.clone(),
        secure_cookies: config.issuer.secure_cookies || config.is_production(),
    }
}

/// First-boot bootstrap: a `master` realm with an active signing key and
/// the built-in scopes, so a fresh installation is immediately usable.
async fn bootstrap_master_realm(pool: &sqlx::PgPool, master_key: &str) -> Result<(), ApiError> {
    let realms = RealmRepository::new(pool.clone());
    let keys_repo = KeyRepository::new(pool.clone());
    let clients = ClientRepository::new(pool.clone());

    let realm = match realms.find_by_name("master").await? {
        Some(realm) => realm,
        None => {
            info!("creating master realm");
            realms.create("master", "Master").await?
        }
    };

    service::provisioning::provision_realm(&realm, &clients, &keys_repo, master_key).await
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1: Load configuration from environment
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────────
    // Step 2: Initialize structured logging
    // ─────────────────────────────────────────────────────────────────────
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        issuer = %config.issuer.base_url,
        "Starting identity-service"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: Database pool and schema migrations
    // ─────────────────────────────────────────────────────────────────────
    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: First-boot bootstrap
    // ─────────────────────────────────────────────────────────────────────
    bootstrap_master_realm(&db_pool, &config.keys.master_key)
        .await
        .expect("Failed to bootstrap master realm");

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: Compose services and background workers
    // ─────────────────────────────────────────────────────────────────────
    let app_state = web::Data::new(build_state(&config, db_pool.clone()));
    let db_pool = web::Data::new(db_pool);

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: Configure and start HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    info!("Server listening on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            // Middleware stack (first added = last executed)
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            // Shared state
            .app_data(app_state.clone())
            .app_data(db_pool.clone())
            // Routes
            .configure(routes::configure)
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
