use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use fairshare_api::{create_app, AppState};
use fairshare_config::{AppConfig, AuditBackend};
use fairshare_domain::{AuditRepository, AvailabilityEvent, Clock, SystemClock};
use fairshare_engine::{EngineContext, FairnessEngine, LoadModel, Repositories};
use fairshare_infrastructure::{
    DatabaseManager, FeedLoader, InMemoryAuditRepository, InMemoryBaselineRepository,
    InMemoryProposalRepository, InMemoryRosterRepository, SqliteAuditRepository,
};
use fairshare_observability::{LogAlertChannel, MetricsCollector};

const AVAILABILITY_CHANNEL_CAPACITY: usize = 256;

/// 启动参数中与配置文件无关的部分
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub api_enabled: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { api_enabled: true }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    options: RunOptions,
    engine: FairnessEngine,
    database: Option<DatabaseManager>,
    availability_tx: mpsc::Sender<AvailabilityEvent>,
    availability_rx: Mutex<Option<mpsc::Receiver<AvailabilityEvent>>>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, options: RunOptions) -> Result<Self> {
        Self::with_clock(config, options, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        config: AppConfig,
        options: RunOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        info!("初始化应用程序");

        let (audit, database) = create_audit_repository(&config).await?;
        let roster = Arc::new(InMemoryRosterRepository::with_constraints(
            config.constraints.clone(),
        ));
        let metrics = Arc::new(MetricsCollector::new().context("创建指标收集器失败")?);

        let ctx = EngineContext::new(
            Repositories {
                roster,
                proposals: Arc::new(InMemoryProposalRepository::new()),
                baselines: Arc::new(InMemoryBaselineRepository::new()),
                audit,
            },
            clock,
            metrics,
            Arc::new(LogAlertChannel::new("fairshare".to_string())),
            LoadModel::from_config(&config.fairness),
        );
        let engine = FairnessEngine::new(
            ctx,
            config.solver.clone(),
            config.scheduler.clone(),
            config.marketplace.clone(),
        )
        .context("创建公平分配引擎失败")?;

        let (availability_tx, availability_rx) = mpsc::channel(AVAILABILITY_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            options,
            engine,
            database,
            availability_tx,
            availability_rx: Mutex::new(Some(availability_rx)),
            metrics_handle: None,
        })
    }

    /// 在API上暴露Prometheus指标
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn engine(&self) -> &FairnessEngine {
        &self.engine
    }

    /// 上游可用状态事件的入口
    pub fn availability_sender(&self) -> mpsc::Sender<AvailabilityEvent> {
        self.availability_tx.clone()
    }

    /// 载入数据源；没有基线时立即求解一次
    pub async fn bootstrap(&self) -> Result<()> {
        let feed = FeedLoader::load(&self.config.feeds)
            .await
            .context("载入数据源失败")?;
        if feed.workers.is_empty() && feed.items.is_empty() {
            info!("未配置数据源，等待名册通过接口载入");
            return Ok(());
        }

        info!(
            "载入 {} 名Worker，{} 个工作项",
            feed.workers.len(),
            feed.items.len()
        );
        self.engine
            .load_roster(feed.workers, feed.items, None)
            .await
            .context("写入名册失败")?;

        if self.engine.context().ledger.current().await?.is_none() {
            match self.engine.run_optimization_now(None).await {
                Ok(report) => info!(
                    "初始基线已发布，版本 {}，Gini {:.4}",
                    report.assignment.version, report.assignment.snapshot.gini
                ),
                Err(e) if e.is_business_outcome() => warn!("初始批量优化不可行: {}", e),
                Err(e) => return Err(e).context("初始批量优化失败"),
            }
        }
        Ok(())
    }

    /// 运行全部后台组件，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let availability_rx = self
            .availability_rx
            .lock()
            .await
            .take()
            .context("应用已经在运行")?;

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let scheduler = self.engine.scheduler();
        handles.push((
            "scheduler",
            tokio::spawn(async move {
                if let Err(e) = scheduler.start().await {
                    error!("批量优化调度运行失败: {}", e);
                }
            }),
        ));

        let sweeper = self.engine.sweeper();
        handles.push((
            "sweeper",
            tokio::spawn(async move {
                if let Err(e) = sweeper.start().await {
                    error!("过期清理运行失败: {}", e);
                }
            }),
        ));

        let listener = self.engine.availability_listener();
        handles.push((
            "availability",
            tokio::spawn(async move {
                if let Err(e) = listener.listen(availability_rx).await {
                    error!("可用状态监听失败: {}", e);
                }
            }),
        ));

        if self.options.api_enabled && self.config.api.enabled {
            let server = self.start_api(shutdown_rx.resubscribe()).await?;
            handles.push(("api", server));
        }

        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，停止后台组件");

        self.engine.scheduler().stop().await;
        self.engine.sweeper().stop().await;
        self.engine.availability_listener().stop().await;

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("组件 {} 退出异常: {}", name, e);
            }
        }

        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("所有组件已停止");
        Ok(())
    }

    async fn start_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<JoinHandle<()>> {
        let state = AppState {
            engine: self.engine.clone(),
            availability: self.availability_tx.clone(),
        };
        let mut app = create_app(state, &self.config.api);
        if let (true, Some(handle)) = (
            self.config.observability.metrics_enabled,
            self.metrics_handle.clone(),
        ) {
            app = app.merge(metrics_router(&self.config.observability.metrics_endpoint, handle));
        }

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        Ok(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            };
            if let Err(e) = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("API服务器运行失败: {}", e);
            }
        }))
    }
}

fn metrics_router(endpoint: &str, handle: PrometheusHandle) -> Router {
    Router::new().route(endpoint, get(move || async move { handle.render() }))
}

/// 按配置选择审计存储
async fn create_audit_repository(
    config: &AppConfig,
) -> Result<(Arc<dyn AuditRepository>, Option<DatabaseManager>)> {
    match config.storage.audit_backend {
        AuditBackend::Memory => {
            info!("审计日志使用内存存储");
            Ok((Arc::new(InMemoryAuditRepository::new()), None))
        }
        AuditBackend::Sqlite => {
            let database = DatabaseManager::from_config(&config.storage)
                .await
                .context("连接审计数据库失败")?;
            database.migrate().await.context("初始化审计表失败")?;
            let repository = SqliteAuditRepository::new(database.pool().clone());
            Ok((Arc::new(repository), Some(database)))
        }
    }
}
