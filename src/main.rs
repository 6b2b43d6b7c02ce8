use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use fairshare::{wait_for_shutdown_signal, Application, RunOptions, ShutdownManager, SHUTDOWN_GRACE_PERIOD};
use fairshare_config::{AppConfig, LogFormat};
use fairshare_observability::{init_metrics, init_structured_logging, LoggingConfig};

#[derive(Debug, Parser)]
#[command(name = "fairshare", version, about = "公平分配引擎")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE", default_value = "config/fairshare.toml")]
    config: String,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty"])]
    log_format: Option<String>,

    /// 不启动HTTP接口
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = std::path::Path::new(&cli.config)
        .exists()
        .then_some(cli.config.as_str());
    let mut config =
        AppConfig::load(config_path).with_context(|| format!("加载配置文件失败: {}", cli.config))?;
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.observability.log_format = format.parse().map_err(anyhow::Error::msg)?;
    }

    init_structured_logging(LoggingConfig {
        level: config.observability.log_level.clone(),
        format: match config.observability.log_format {
            LogFormat::Json => fairshare_observability::LogFormat::Json,
            LogFormat::Pretty => fairshare_observability::LogFormat::Pretty,
        },
        ..LoggingConfig::default()
    })?;

    info!("启动公平分配引擎");
    match config_path {
        Some(path) => info!("配置文件: {path}"),
        None => warn!("配置文件 {} 不存在，使用默认配置", cli.config),
    }

    let mut app = Application::new(
        config.clone(),
        RunOptions {
            api_enabled: !cli.no_api,
        },
    )
    .await?;
    if config.observability.metrics_enabled {
        app = app.with_metrics(init_metrics()?);
    }
    app.bootstrap().await?;

    let shutdown_manager = ShutdownManager::new();
    let app = Arc::new(app);
    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("公平分配引擎已退出");
    Ok(())
}
