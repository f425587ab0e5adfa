use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub frontend_base_url: String,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub s3: S3Config,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let frontend_base_url =
            std::env::var("FRONTEND_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let jwt = JwtConfig {
            secret: std::env::var("SIGNING_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authkit".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authkit-users".into()),
            ttl_minutes: std::env::var("TOKEN_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            user: std::env::var("SMTP_USER").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
        };
        let s3 = S3Config {
            endpoint: std::env::var("S3_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "profile-pics".into()),
            access_key: std::env::var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: std::env::var("S3_SECRET_KEY").unwrap_or_default(),
        };
        Ok(Self {
            database_url,
            frontend_base_url,
            jwt,
            smtp,
            s3,
        })
    }
}
