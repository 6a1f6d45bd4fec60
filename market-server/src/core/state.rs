use std::sync::Arc;

use dashmap::DashMap;
use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use tokio::sync::Mutex;

use crate::core::Config;
use crate::db::DbService;
use crate::notify::NotificationService;
use crate::orders::OrderService;
use crate::payments::{GatewayClient, PaymentReconciler, PaymentService};
use crate::utils::AppError;

/// 订单锁注册表
///
/// 每个订单聚合一个异步互斥锁，保证同一订单上的状态流转串行执行。
/// 两个并发的流转请求不可能从同一个旧状态同时成功进入不同的新状态。
#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// 获取指定订单的锁 (不存在则创建)
    pub fn lock_for(&self, order_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | Surreal<Db> | 嵌入式数据库 |
/// | gateway | Arc<GatewayClient> | 支付网关客户端 (复用连接池) |
/// | order_locks | Arc<OrderLocks> | 订单级互斥锁注册表 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 嵌入式数据库 (SurrealDB)
    pub db: Surreal<Db>,
    /// 支付网关客户端
    pub gateway: Arc<GatewayClient>,
    /// 订单锁注册表
    pub order_locks: Arc<OrderLocks>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构
    /// 2. 数据库 (work_dir/database/market.db)
    /// 3. 网关客户端
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        let db_dir = config.database_dir();
        std::fs::create_dir_all(&db_dir)
            .map_err(|e| AppError::internal(format!("Failed to create work directory: {e}")))?;

        let db_path = db_dir.join("market.db");
        let db_service = DbService::new(&db_path.to_string_lossy()).await?;

        let gateway = Arc::new(GatewayClient::new(config.gateway.clone())?);

        Ok(Self {
            config: config.clone(),
            db: db_service.db,
            gateway,
            order_locks: Arc::new(OrderLocks::new()),
        })
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用
    ///
    /// 启动的任务：
    /// - 待支付订单过期回收 (ExpiryWorker)
    pub fn start_background_tasks(&self) {
        crate::orders::ExpiryWorker::spawn(self.clone());
    }

    /// 获取数据库实例
    pub fn get_db(&self) -> Surreal<Db> {
        self.db.clone()
    }

    /// 订单服务
    pub fn order_service(&self) -> OrderService {
        OrderService::new(self.db.clone(), &self.config, self.order_locks.clone())
    }

    /// 支付发起服务
    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(self.db.clone(), &self.config, self.gateway.clone())
    }

    /// Webhook 对账器
    pub fn reconciler(&self) -> PaymentReconciler {
        PaymentReconciler::new(
            self.db.clone(),
            &self.config,
            self.gateway.clone(),
            self.order_locks.clone(),
        )
    }

    /// 通知落库服务
    pub fn notifier(&self) -> NotificationService {
        NotificationService::new(self.db.clone())
    }
}
