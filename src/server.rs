//! 服务组装与运行

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::auth::{
    AuthGateway, BootEpoch, Clock, Denylist, JwtService, MokaDenylist, RedisDenylist,
    RefreshCoordinator, ServiceKeyManager, SettingsResolver, SystemClock, TokenIssueService,
};
use crate::config::{AuthConfig, ServerConfig};
use crate::error::{Result, ServerError};
use crate::http::{AuthHttpServer, HttpServerState};
use crate::infra::{Database, RedisClient};
use crate::repository::{PgSettingsRepository, SettingsStore, UserRepository, UserStore};

/// 认证核心的全部服务（与存储实现无关，测试中用内存存储组装）
#[derive(Clone)]
pub struct AuthServices {
    pub jwt: Arc<JwtService>,
    pub boot_epoch: Arc<BootEpoch>,
    pub settings: Arc<SettingsResolver>,
    pub denylist: Arc<dyn Denylist>,
    pub gateway: Arc<AuthGateway>,
    pub refresh_coordinator: Arc<RefreshCoordinator>,
    pub token_issue_service: Arc<TokenIssueService>,
}

impl AuthServices {
    pub fn build(
        config: &AuthConfig,
        clock: Arc<dyn Clock>,
        boot_epoch: Arc<BootEpoch>,
        users: Arc<dyn UserStore>,
        settings_store: Arc<dyn SettingsStore>,
        denylist: Arc<dyn Denylist>,
    ) -> Self {
        let jwt = Arc::new(JwtService::new(&config.jwt_secret, config.issuer.clone(), clock));
        let settings = Arc::new(SettingsResolver::new(settings_store, config));

        let gateway = Arc::new(AuthGateway::from_config(
            config,
            jwt.clone(),
            denylist.clone(),
            boot_epoch.clone(),
            users.clone(),
            settings.clone(),
        ));

        // 关闭撤销列表时 refresh 既不检查也不写入
        let refresh_denylist = config.enforce_denylist.then(|| denylist.clone());
        let refresh_coordinator = Arc::new(RefreshCoordinator::new(
            jwt.clone(),
            users.clone(),
            settings.clone(),
            boot_epoch.clone(),
            refresh_denylist,
            config.refresh_lifetime_seconds(),
        ));

        let token_issue_service = Arc::new(TokenIssueService::new(
            jwt.clone(),
            users,
            settings.clone(),
            boot_epoch.clone(),
            config.refresh_lifetime_seconds(),
        ));

        Self {
            jwt,
            boot_epoch,
            settings,
            denylist,
            gateway,
            refresh_coordinator,
            token_issue_service,
        }
    }

    pub fn http_state(&self, service_key: &str) -> HttpServerState {
        HttpServerState {
            gateway: self.gateway.clone(),
            refresh_coordinator: self.refresh_coordinator.clone(),
            token_issue_service: self.token_issue_service.clone(),
            settings: self.settings.clone(),
            service_key_manager: Arc::new(ServiceKeyManager::new(service_key)),
        }
    }
}

/// 认证服务器
pub struct AuthServer {
    config: ServerConfig,
    services: AuthServices,
    database: Database,
    redis_client: Option<RedisClient>,
}

impl AuthServer {
    /// 连接数据库与 Redis，组装全部服务
    pub async fn new(config: ServerConfig) -> Result<Self> {
        info!("🔧 初始化认证服务器组件...");

        info!("🔌 初始化数据库连接...");
        let database = Database::new(&config.database_url, config.database_max_connections).await?;
        let pool = database.pool().clone();
        let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(Arc::new(pool.clone())));
        let settings_store: Arc<dyn SettingsStore> = Arc::new(PgSettingsRepository::new(pool));
        info!("✅ Repository 层初始化完成");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (denylist, redis_client): (Arc<dyn Denylist>, Option<RedisClient>) =
            match &config.cache.redis {
                Some(redis_config) => {
                    let client = RedisClient::new(redis_config).await?;
                    info!("✅ 撤销列表使用 Redis（多实例共享）");
                    (Arc::new(RedisDenylist::new(client.clone(), clock.clone())), Some(client))
                }
                None => {
                    warn!("⚠️ 未配置 Redis，撤销列表仅在本进程内有效");
                    let denylist = MokaDenylist::new(config.cache.denylist_max_capacity, clock.clone());
                    (Arc::new(denylist), None)
                }
            };

        let boot_epoch = Arc::new(BootEpoch::from_config(config.auth.boot_epoch, clock.clone()));
        info!("🔖 当前 boot epoch: {}", boot_epoch.current());

        let services = AuthServices::build(
            &config.auth,
            clock,
            boot_epoch,
            users,
            settings_store,
            denylist,
        );
        info!("✅ 认证系统初始化完成");

        Ok(Self {
            config,
            services,
            database,
            redis_client,
        })
    }

    pub fn services(&self) -> &AuthServices {
        &self.services
    }

    /// 启动后台任务与 HTTP 服务器
    pub async fn run(&self) -> Result<()> {
        info!("🚀 启动认证服务器...");

        if self.config.enable_metrics {
            self.start_pool_metrics_task();
        }

        let state = self.services.http_state(&self.config.auth.service_key);
        let http_server = AuthHttpServer::new(state, self.config.bind_address());
        http_server
            .start()
            .await
            .map_err(|e| ServerError::Internal(format!("HTTP 服务器运行失败: {}", e)))?;

        info!("👋 认证服务器已停止");
        Ok(())
    }

    /// 每分钟上报连接池状态
    fn start_pool_metrics_task(&self) {
        let redis_client = self.redis_client.clone();
        let database = self.database.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;

                if let Some(ref redis) = redis_client {
                    let state = redis.pool_state();
                    let active = state.connections - state.idle_connections;
                    crate::infra::metrics::record_redis_pool(active, state.idle_connections);
                }

                let (db_active, db_idle) = database.pool_state();
                crate::infra::metrics::record_db_pool(db_active, db_idle);
            }
        });
    }
}
