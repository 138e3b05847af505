use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志；RUST_LOG 优先，否则使用配置中的级别
pub fn init_logger(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("paperagent={}", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
