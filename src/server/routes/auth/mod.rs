pub mod login;
pub mod oauth;
pub mod reset;
pub mod signup;
pub mod verify;

use crate::server::router::QuillState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router() -> Router<QuillState> {
    Router::new()
        .route("/login", get(login::login_form).post(login::login_handler))
        .route("/logout", post(login::logout_handler))
        .route(
            "/signup",
            get(signup::signup_form).post(signup::signup_handler),
        )
        .route(
            "/onboarding",
            get(signup::onboarding_form).post(signup::onboarding_handler),
        )
        .route(
            "/onboarding/github",
            get(signup::provider_onboarding_form).post(signup::provider_onboarding_handler),
        )
        .route(
            "/verify",
            get(verify::verify_page).post(verify::verify_handler),
        )
        .route("/forgot-password", post(reset::forgot_password_handler))
        .route(
            "/reset-password",
            get(reset::reset_password_form).post(reset::reset_password_handler),
        )
        .route("/auth/github", post(oauth::github_entry))
        .route("/auth/github/callback", get(oauth::github_callback))
}
