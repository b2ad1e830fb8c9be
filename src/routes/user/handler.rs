use axum::{
    Extension,
    extract::{Json, State},
    http::StatusCode,
    response::{AppendHeaders, IntoResponse},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::{
    AppState,
    email::{password_reset_email, reset_link},
    error::AppError,
    middleware::CurrentUser,
    routes::oauth::model::OAuthLink,
    token::{issue_access_token, issue_refresh_token, verify_refresh_token},
    utils::{
        REFRESH_COOKIE, access_cookie, clear_session_cookies, hash_password, message_to_api_response,
        normalize_email, session_cookies, success_to_api_response,
    },
};

use super::model::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshTokenResponse,
    RegisterRequest, ResetPasswordRequest, User, is_unique_violation,
};

fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn validate_new_password(password: &str) -> Result<(), AppError> {
    if password.len() < 6 {
        return Err(AppError::Validation(
            "Please enter a password with 6 or more characters".to_string(),
        ));
    }
    Ok(())
}

/// 签发访问+刷新令牌并把刷新令牌写回用户记录（旋转点：旧会话就此失效）
pub(crate) async fn issue_session(
    state: &AppState,
    user: &User,
) -> Result<(String, String), AppError> {
    let access = issue_access_token(user.id, user.role, &state.config)?;
    let refresh = issue_refresh_token(user.id, &state.config)?;
    User::set_refresh_token(&state.pool, user.id, Some(&refresh)).await?;
    Ok((access, refresh))
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if !is_plausible_email(&req.email) {
        return Err(AppError::Validation(
            "Please include a valid email".to_string(),
        ));
    }
    validate_new_password(&req.password)?;

    let email = normalize_email(&req.email);
    let password_hash = hash_password(req.password).await?;

    let user = User::create(&state.pool, name, &email, Some(&password_hash), "")
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("User already exists".to_string())
            } else {
                e.into()
            }
        })?;

    tracing::info!(user_id = %user.id, "registered new user");

    let (access, refresh) = issue_session(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        AppendHeaders(session_cookies(&access, &refresh, &state.config)),
        success_to_api_response(user),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);

    let mut user = User::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if user.is_blocked {
        return Err(AppError::Forbidden("Account blocked".to_string()));
    }

    // 没有密码哈希的账号：有外部身份就引导走外部登录，否则执行一次性修复
    if user.password_hash.is_none() {
        if OAuthLink::exists_for_user(&state.pool, user.id).await? {
            return Err(AppError::Unauthorized(
                "This account uses an external identity provider. Sign in with it instead."
                    .to_string(),
            ));
        }

        tracing::warn!(user_id = %user.id, "repairing account left without a password hash");
        let password_hash = hash_password(req.password.clone()).await?;
        User::set_password(&state.pool, user.id, &password_hash).await?;
        user.password_hash = Some(password_hash);
    }

    if !user.verify_login(req.password).await? {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let (access, refresh) = issue_session(&state, &user).await?;

    Ok((
        StatusCode::OK,
        AppendHeaders(session_cookies(&access, &refresh, &state.config)),
        success_to_api_response(user),
    ))
}

/// 公开接口：带不带会话都能注销
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        User::clear_refresh_token_by_value(&state.pool, cookie.value()).await?;
    }

    Ok((
        StatusCode::OK,
        AppendHeaders(clear_session_cookies(&state.config)),
        message_to_api_response("Logged out successfully"),
    ))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthenticated("Not authenticated".to_string()))?;

    let claims =
        verify_refresh_token(&token, &state.config).map_err(|_| AppError::InvalidToken)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

    let user = User::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(AppError::InvalidToken)?;

    // 签名有效还不够：必须等于用户记录上存的那一个，且账号未被封禁
    if user.refresh_token.as_deref() != Some(token.as_str()) || user.is_blocked {
        return Err(AppError::InvalidToken);
    }

    let access = issue_access_token(user.id, user.role, &state.config)?;
    let cookie = access_cookie(&access, &state.config);

    Ok((
        StatusCode::OK,
        AppendHeaders([(axum::http::header::SET_COOKIE, cookie)]),
        success_to_api_response(RefreshTokenResponse {
            access_token: access,
        }),
    ))
}

#[axum::debug_handler]
pub async fn profile(
    Extension(current): Extension<CurrentUser>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_id(&state.pool, current.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn change_password(
    Extension(current): Extension<CurrentUser>,
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_new_password(&req.new_password)?;

    let user = User::find_by_id(&state.pool, current.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.password_hash.is_none() {
        return Err(AppError::Unauthorized(
            "This account signs in through an identity provider and has no password.".to_string(),
        ));
    }

    if !user.verify_login(req.current_password).await? {
        return Err(AppError::Unauthorized(
            "Incorrect current password".to_string(),
        ));
    }

    let password_hash = hash_password(req.new_password).await?;
    User::set_password(&state.pool, user.id, &password_hash).await?;

    Ok((
        StatusCode::OK,
        message_to_api_response("Password updated successfully"),
    ))
}

/// 无论邮箱是否注册都返回同一句话，防止账号枚举
#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);

    match User::find_by_email(&state.pool, &email).await? {
        None => {
            tracing::debug!("password reset requested for unknown email");
        }
        Some(_) => {
            let ticket = super::model::ResetTicket::issue(
                &state.pool,
                &email,
                state.config.reset_ticket_ttl_secs as i64,
            )
            .await?;

            let link = reset_link(&state.config.frontend_url, &ticket.token);
            let message = password_reset_email(&email, &link);

            // 投递失败也不能让响应暴露邮箱是否存在
            if let Err(err) = state.mailer.send(&message).await {
                tracing::error!("failed to send password reset email: {:?}", err);
            }
        }
    }

    Ok((
        StatusCode::OK,
        message_to_api_response("If this email is registered, a reset link has been sent."),
    ))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_new_password(&req.new_password)?;

    let ticket = super::model::ResetTicket::find_valid(&state.pool, &req.token)
        .await?
        .ok_or(AppError::InvalidOrExpired)?;

    let user = User::find_by_email(&state.pool, &ticket.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let password_hash = hash_password(req.new_password).await?;

    let consumed =
        super::model::ResetTicket::consume(&state.pool, ticket.id, user.id, &password_hash)
            .await?;
    if !consumed {
        return Err(AppError::InvalidOrExpired);
    }

    tracing::info!(user_id = %user.id, "password reset completed");

    Ok((
        StatusCode::OK,
        message_to_api_response("Password reset successfully"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plausible_emails() {
        assert!(is_plausible_email("ann@x.com"));
        assert!(is_plausible_email(" ann@sub.domain.org "));
        assert!(!is_plausible_email("ann"));
        assert!(!is_plausible_email("@x.com"));
        assert!(!is_plausible_email("ann@nodot"));
        assert!(!is_plausible_email("ann@.com"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_new_password("12345").is_err());
        assert!(validate_new_password("123456").is_ok());
    }
}
