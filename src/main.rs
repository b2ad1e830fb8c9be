use std::net::{IpAddr, SocketAddr};

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use userhub::{
    AppState,
    config::Config,
    email::sender_from_config,
    middleware::{auth_middleware, log_errors, require_admin},
    routes,
};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'userhub_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    let http = reqwest::Client::new();
    let mailer = sender_from_config(&config, http.clone());

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        http,
        mailer,
    };

    // 公开路由：注册、登录、外部身份、找回密码
    let public_routes = Router::new()
        .route("/auth/register", post(routes::user::register))
        .route("/auth/login", post(routes::user::login))
        .route("/auth/logout", post(routes::user::logout))
        .route("/auth/refresh", post(routes::user::refresh_token))
        .route("/auth/google", post(routes::oauth::google_auth))
        .route("/auth/forgot-password", post(routes::user::forgot_password))
        .route("/auth/reset-password", post(routes::user::reset_password));

    // 受保护路由：会话门之后
    let protected_routes = Router::new()
        .route("/users/profile", get(routes::user::profile))
        .route("/users/change-password", put(routes::user::change_password))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    // 管理路由：会话门之后再过角色检查
    let admin_routes = Router::new()
        .route("/admin/users/{id}", put(routes::admin::update_user))
        .route(
            "/admin/users/{id}/impersonate",
            post(routes::admin::impersonate),
        )
        .layer(from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let router = Router::new().nest(
        &config.api_base_uri,
        Router::new()
            .merge(public_routes)
            .merge(protected_routes)
            .merge(admin_routes),
    );

    // 边界日志
    let router = router.layer(ServiceBuilder::new().layer(from_fn(log_errors)));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .await
    .expect("Failed to start server");
}
