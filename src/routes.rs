use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header::STRICT_TRANSPORT_SECURITY},
    middleware,
    routing::{get, patch, post, put},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{
    AppState,
    handlers::{self, auth, books, fines, loans, reports, settings, users},
    middleware_auth,
};

/// Assemble the full HTTP surface: public auth routes, the authenticated API and
/// the cross-cutting tower layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/register", post(auth::register))
        .route("/api/v1/login", post(auth::login))
        .route("/api/v1/refresh", post(auth::refresh_token))
        .route("/api/v1/password-reset", post(auth::request_password_reset))
        .route("/api/v1/password-reset/confirm", post(auth::confirm_password_reset));

    let protected_routes = Router::new()
        .route("/api/v1/me", get(auth::me).put(auth::update_profile))
        .route("/api/v1/me/password", put(auth::change_password))
        .route("/api/v1/me/loans", get(loans::my_loans))
        .route("/api/v1/me/fines", get(fines::my_fines))
        .route("/api/v1/books", get(books::list_books).post(books::create_book))
        .route("/api/v1/books/categories", get(books::list_categories))
        .route(
            "/api/v1/books/{id}",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        .route("/api/v1/users", get(users::list_users).post(users::create_user))
        .route("/api/v1/users/{id}", get(users::get_user).put(users::update_user))
        .route("/api/v1/users/{id}/active", patch(users::set_active))
        .route("/api/v1/users/{id}/reset-password", post(users::reset_user_password))
        .route("/api/v1/loans", post(loans::borrow_books))
        .route("/api/v1/loans/return", post(loans::return_books))
        .route("/api/v1/loans/history", get(loans::history))
        .route("/api/v1/fines", get(fines::list_fines))
        .route("/api/v1/fines/{id}/payments", post(fines::record_payment))
        .route(
            "/api/v1/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/api/v1/reports/summary", get(reports::summary))
        .route("/api/v1/reports/overdue", get(reports::overdue))
        .route("/api/v1/reports/popular", get(reports::popular))
        .route("/api/v1/reports/members", get(reports::members))
        .route("/api/v1/reports/fines", get(reports::outstanding_fines))
        .route("/api/v1/reports/activity", get(reports::recent_activity))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::auth_middleware,
        ));

    let hsts_value: HeaderValue =
        HeaderValue::from_static("max-age=63072000; includeSubDomains; preload");

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(SetResponseHeaderLayer::if_not_present(
            STRICT_TRANSPORT_SECURITY,
            hsts_value,
        ))
}
