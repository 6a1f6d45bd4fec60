//! Parts Marketplace Server
//!
//! # 架构概述
//!
//! 市场后端的核心是订单生命周期与支付对账引擎：
//!
//! - **库存台账** (`orders::inventory`): 按 listing 原子扣减/回补库存
//! - **订单状态机** (`orders::service`): 状态图 + 角色权限驱动的状态流转
//! - **支付网关客户端** (`payments::gateway`): 签名跳转与同步验证调用
//! - **Webhook 对账器** (`payments::reconciler`): 不可信支付通知的多级验证
//! - **通知落库** (`notify`): fire-and-forget 通知记录
//!
//! # 模块结构
//!
//! ```text
//! market-server/src/
//! ├── core/          # 配置、状态、服务器
//! ├── auth/          # 上游注入的用户身份
//! ├── api/           # HTTP 路由和处理器
//! ├── db/            # 数据库层 (嵌入式 SurrealDB)
//! ├── orders/        # 下单提交协议、状态机、库存台账、过期回收
//! ├── payments/      # 签名、网关客户端、发起支付、Webhook 对账
//! ├── notify/        # 通知落库
//! └── utils/         # 错误、日志
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod notify;
pub mod orders;
pub mod payments;
pub mod utils;

// Re-export 公共类型
pub use auth::CurrentUser;
pub use core::{Config, Server, ServerState};
pub use orders::{InventoryLedger, OrderService};
pub use payments::{GatewayClient, PaymentReconciler, PaymentService};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置进程环境：加载 .env 并初始化日志
pub fn setup_environment() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(level.as_deref(), log_dir.as_deref());
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
    ____             __        __  ___           __        __
   / __ \____ ______/ /______ /  |/  /___ ______/ /_____  / /_
  / /_/ / __ `/ ___/ __/ ___// /|_/ / __ `/ ___/ //_/ _ \/ __/
 / ____/ /_/ / /  / /_(__  )/ /  / / /_/ / /  / ,< /  __/ /_
/_/    \__,_/_/   \__/____//_/  /_/\__,_/_/  /_/|_|\___/\__/
    "#
    );
}
