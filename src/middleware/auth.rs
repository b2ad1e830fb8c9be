use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    routes::user::model::{Role, User},
    token::{verify_access_token, verify_impersonation_token},
    utils::ACCESS_COOKIE,
};

/// 会话门通过后挂在请求上的身份
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
    pub impersonator_id: Option<Uuid>,
}

pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// cookie优先，其次Authorization头
pub fn token_from_sources(cookie: Option<&str>, bearer: Option<&str>) -> Option<String> {
    cookie.map(str::to_owned).or_else(|| bearer.map(str::to_owned))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_sources(
        jar.get(ACCESS_COOKIE).map(|c| c.value()),
        bearer_from_headers(req.headers()),
    )
    .ok_or_else(|| AppError::Unauthenticated("Not authorized, no token".to_string()))?;

    // 先按访问令牌验签，再按冒充令牌验签；两类密钥不同
    let claims = verify_access_token(&token, &state.config)
        .or_else(|_| verify_impersonation_token(&token, &state.config))
        .map_err(|_| AppError::Unauthenticated("Not authorized, token failed".to_string()))?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthenticated("Not authorized, token failed".to_string()))?;

    let user = User::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Not authorized, user not found".to_string()))?;

    // 封禁在验证时生效，不只在登录时
    if user.is_blocked {
        return Err(AppError::Forbidden(
            "Your account has been blocked".to_string(),
        ));
    }

    let impersonator_id = claims
        .impersonator_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());
    if let Some(admin_id) = impersonator_id {
        tracing::info!(user_id = %user.id, admin_id = %admin_id, "request served under impersonation");
    }

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        role: user.role,
        impersonator_id,
    });

    Ok(next.run(req).await)
}

pub fn permits(role: Role, allowed: &[Role]) -> bool {
    match role {
        Role::Admin => allowed.contains(&Role::Admin),
        Role::User => allowed.contains(&Role::User),
    }
}

/// 必须叠在auth_middleware内侧，身份先被挂上才轮到它
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let Some(current) = req.extensions().get::<CurrentUser>().cloned() else {
        return Err(AppError::Unauthenticated(
            "Not authorized, no token".to_string(),
        ));
    };

    if !permits(current.role, &[Role::Admin]) {
        return Err(AppError::Forbidden(
            "You do not have access to this resource".to_string(),
        ));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_wins_over_bearer() {
        assert_eq!(
            token_from_sources(Some("from-cookie"), Some("from-header")),
            Some("from-cookie".to_string())
        );
        assert_eq!(
            token_from_sources(None, Some("from-header")),
            Some("from-header".to_string())
        );
        assert_eq!(token_from_sources(None, None), None);
    }

    #[test]
    fn bearer_header_requires_the_scheme_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_from_headers(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(bearer_from_headers(&headers), None);

        assert_eq!(bearer_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn role_check_is_exhaustive() {
        assert!(permits(Role::Admin, &[Role::Admin]));
        assert!(!permits(Role::User, &[Role::Admin]));
        assert!(permits(Role::User, &[Role::User, Role::Admin]));
        assert!(!permits(Role::Admin, &[]));
    }
}
