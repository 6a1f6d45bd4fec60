use rust_decimal::Decimal;
use std::str::FromStr;

/// 服务器配置 - 市场后端的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/partsmarket | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | BASE_URL | http://localhost:3000 | 本服务对外地址 (默认回调地址) |
/// | TAX_RATE | 0.15 | 税率 (VAT) |
/// | SHIPPING_FEE | 100.00 | 默认运费 |
/// | ORDER_EXPIRY_MINUTES | 1440 | 待支付订单过期时间 (分钟) |
/// | ORDER_EXPIRY_SCAN_SECS | 60 | 过期扫描间隔 (秒) |
/// | GATEWAY_MERCHANT_ID | (空) | 网关商户 ID |
/// | GATEWAY_MERCHANT_KEY | (空) | 网关商户密钥 |
/// | GATEWAY_PASSPHRASE | (未设置) | 签名口令 (可选) |
/// | GATEWAY_URL | https://sandbox.payfast.co.za/eng/process | 支付跳转地址 |
/// | GATEWAY_VALIDATE_URL | https://sandbox.payfast.co.za/eng/query/validate | 验证回调地址 |
/// | GATEWAY_ALLOWED_IPS | (空) | 通知来源 IP 白名单 (逗号分隔) |
/// | GATEWAY_VERIFY_TIMEOUT_MS | 10000 | 验证请求超时 (毫秒) |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/partsmarket HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 本服务对外地址 (构造默认回调 URL)
    pub base_url: String,
    /// 税率
    pub tax_rate: Decimal,
    /// 默认运费
    pub shipping_fee: Decimal,
    /// 待支付订单过期时间 (分钟)
    pub order_expiry_minutes: i64,
    /// 过期扫描间隔 (秒)
    pub order_expiry_scan_secs: u64,
    /// 支付网关配置
    pub gateway: GatewayConfig,
}

/// 支付网关配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 商户 ID
    pub merchant_id: String,
    /// 商户密钥 (参与签名，不在线上传输)
    pub merchant_key: String,
    /// 签名口令 (可选，追加到签名串尾部)
    pub passphrase: Option<String>,
    /// 支付跳转地址
    pub redirect_url: String,
    /// 同步验证地址
    pub validate_url: String,
    /// 通知来源 IP 白名单；为空时进入降级模式 (接受所有来源并告警)
    pub allowed_ips: Vec<String>,
    /// 验证请求超时 (毫秒)
    pub verify_timeout_ms: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| Decimal::from_str(v.trim()).ok())
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: env_or("WORK_DIR", "/var/lib/partsmarket"),
            http_port: env_parse("HTTP_PORT", 3000),
            environment: env_or("ENVIRONMENT", "development"),
            base_url: env_or("BASE_URL", "http://localhost:3000"),
            tax_rate: env_decimal("TAX_RATE", Decimal::new(15, 2)),
            shipping_fee: env_decimal("SHIPPING_FEE", Decimal::new(10000, 2)),
            order_expiry_minutes: env_parse("ORDER_EXPIRY_MINUTES", 1440),
            order_expiry_scan_secs: env_parse("ORDER_EXPIRY_SCAN_SECS", 60),
            gateway: GatewayConfig::from_env(),
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// 数据库目录
    pub fn database_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.work_dir).join("database")
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let passphrase = std::env::var("GATEWAY_PASSPHRASE")
            .ok()
            .filter(|p| !p.is_empty());
        let allowed_ips: Vec<String> = env_or("GATEWAY_ALLOWED_IPS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            merchant_id: env_or("GATEWAY_MERCHANT_ID", ""),
            merchant_key: env_or("GATEWAY_MERCHANT_KEY", ""),
            passphrase,
            redirect_url: env_or("GATEWAY_URL", "https://sandbox.payfast.co.za/eng/process"),
            validate_url: env_or(
                "GATEWAY_VALIDATE_URL",
                "https://sandbox.payfast.co.za/eng/query/validate",
            ),
            allowed_ips,
            verify_timeout_ms: env_parse("GATEWAY_VERIFY_TIMEOUT_MS", 10_000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
