use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{AppendHeaders, IntoResponse},
};

use crate::{
    AppState,
    error::AppError,
    routes::user::issue_session,
    routes::user::model::{User, is_unique_violation},
    utils::{normalize_email, session_cookies, success_to_api_response},
};

use super::model::{GoogleAuthRequest, GoogleUserInfo, OAuthLink, PROVIDER_GOOGLE};

#[axum::debug_handler]
pub async fn google_auth(
    State(state): State<AppState>,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 用上游访问令牌换取档案；令牌无效时不暴露细节
    let response = state
        .http
        .get(&state.config.google_userinfo_url)
        .bearer_auth(&req.access_token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::Unauthenticated("Invalid Google token".to_string()));
    }

    let info: GoogleUserInfo = response
        .json()
        .await
        .map_err(|_| AppError::BadIdentity("Malformed identity profile".to_string()))?;

    let email = info
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            AppError::BadIdentity(
                "Could not retrieve email from the identity provider. Please ensure email \
                 access is granted."
                    .to_string(),
            )
        })?;

    let name = info.display_name(&email);

    let user = match User::find_by_email(&state.pool, &email).await? {
        Some(user) if user.is_blocked => {
            return Err(AppError::Forbidden("Account blocked".to_string()));
        }
        Some(user) => user,
        None => {
            // 首次外部登录：建一个无密码账号
            let picture = info.picture.as_deref().unwrap_or("");
            User::create(&state.pool, &name, &email, None, picture).await?
        }
    };

    if OAuthLink::find(&state.pool, PROVIDER_GOOGLE, &info.sub)
        .await?
        .is_none()
    {
        let snapshot = serde_json::json!({
            "name": name,
            "email": email,
            "picture": info.picture,
        });

        // 并发建链撞唯一键说明链接已经在了，不算错误
        if let Err(err) =
            OAuthLink::create(&state.pool, user.id, PROVIDER_GOOGLE, &info.sub, snapshot).await
        {
            if !is_unique_violation(&err) {
                return Err(err.into());
            }
        } else {
            tracing::info!(user_id = %user.id, provider = PROVIDER_GOOGLE, "linked external identity");
        }
    }

    let (access, refresh) = issue_session(&state, &user).await?;

    Ok((
        StatusCode::OK,
        AppendHeaders(session_cookies(&access, &refresh, &state.config)),
        success_to_api_response(user),
    ))
}
