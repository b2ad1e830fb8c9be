use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::CurrentUser,
    routes::user::model::{Role, User},
    token::issue_impersonation_token,
    utils::success_to_api_response,
};

use super::model::{
    AdminUpdateUserRequest, ImpersonateResponse, ImpersonationAction, ImpersonationLog,
};

/// 单向授权：签发1小时冒充令牌，不配刷新通道；每次签发都落一条审计
#[axum::debug_handler]
pub async fn impersonate(
    Extension(current): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let target = User::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    // 禁止冒充管理员，防止提权链
    match target.role {
        Role::Admin => {
            return Err(AppError::Forbidden(
                "Cannot impersonate another admin".to_string(),
            ));
        }
        Role::User => {}
    }

    ImpersonationLog::record(
        &state.pool,
        current.id,
        target.id,
        ImpersonationAction::Start,
    )
    .await?;

    let token = issue_impersonation_token(target.id, target.role, current.id, &state.config)?;

    tracing::info!(
        admin_id = %current.id,
        target_id = %target.id,
        "impersonation session started"
    );

    Ok((
        StatusCode::OK,
        success_to_api_response(ImpersonateResponse {
            impersonation_token: token,
            user: target,
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_user(
    Extension(current): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if user_id == current.id && matches!(req.role, Some(Role::User)) {
        return Err(AppError::Forbidden(
            "Cannot remove your own admin role".to_string(),
        ));
    }

    let user = User::admin_update(&state.pool, user_id, req.role, req.is_blocked)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.is_blocked {
        tracing::info!(user_id = %user.id, "account blocked by admin");
    }

    Ok((StatusCode::OK, success_to_api_response(user)))
}
