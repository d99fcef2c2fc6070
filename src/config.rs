use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL objects are served from; `{public_base_url}/{key}`.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub api_base: String,
    pub key_id: String,
    pub key_secret: String,
    pub plan_id: String,
    pub refund_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub frontend_url: String,
    pub reset_token_ttl_minutes: i64,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub storage: StorageConfig,
    pub payment: PaymentConfig,
    pub smtp: SmtpConfig,
}

fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing env var {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: env_required("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "coursehub"),
            audience: env_or("JWT_AUDIENCE", "coursehub-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24 * 15),
        };
        let cookie = CookieConfig {
            secure: env_parse("COOKIE_SECURE", true),
        };
        let storage = StorageConfig {
            endpoint: env_required("S3_ENDPOINT")?,
            bucket: env_required("S3_BUCKET")?,
            access_key: env_required("S3_ACCESS_KEY")?,
            secret_key: env_required("S3_SECRET_KEY")?,
            region: env_or("S3_REGION", "us-east-1"),
            public_base_url: env_required("S3_PUBLIC_BASE_URL")?,
        };
        let payment = PaymentConfig {
            api_base: env_or("RAZORPAY_API_BASE", "https://api.razorpay.com/v1"),
            key_id: env_required("RAZORPAY_API_KEY")?,
            key_secret: env_required("RAZORPAY_API_SECRET")?,
            plan_id: env_required("RAZORPAY_PLAN_ID")?,
            refund_days: env_parse("REFUND_DAYS", 7),
        };
        let smtp = SmtpConfig {
            host: env_required("SMTP_HOST")?,
            port: env_parse("SMTP_PORT", 465),
            username: env_required("SMTP_USER")?,
            password: env_required("SMTP_PASSWORD")?,
            from: env_required("SMTP_FROM")?,
        };
        Ok(Self {
            database_url,
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),
            reset_token_ttl_minutes: env_parse("RESET_TOKEN_TTL_MINUTES", 15),
            jwt,
            cookie,
            storage,
            payment,
            smtp,
        })
    }

    pub fn refund_window(&self) -> time::Duration {
        time::Duration::days(self.payment.refund_days)
    }
}
