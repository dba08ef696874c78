use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub paypal: PayPalConfig,
    pub email: EmailConfig,
    pub environment: String,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub api_base_url: String,
    /// Webhook id registered with PayPal. When unset, webhook signature
    /// verification is skipped (logged as a trust degradation).
    pub webhook_id: Option<String>,
    pub return_url: String,
    pub cancel_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("DONATION_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("DONATION_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("DONATION_DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name =
            env::var("DONATION_DATABASE_NAME").unwrap_or_else(|_| "donation_db".to_string());

        let paypal = PayPalConfig {
            client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            client_secret: Secret::new(env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default()),
            api_base_url: env::var("PAYPAL_API_BASE_URL")
                .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            webhook_id: env::var("PAYPAL_WEBHOOK_ID").ok().filter(|v| !v.is_empty()),
            return_url: env::var("DONATION_RETURN_URL")
                .unwrap_or_else(|_| "http://localhost:3000/donation/success".to_string()),
            cancel_url: env::var("DONATION_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:3000/donation/cancel".to_string()),
            request_timeout_secs: env::var("PAYPAL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        };

        let email = EmailConfig {
            enabled: env::var("SMTP_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            smtp_user: env::var("SMTP_USER").unwrap_or_default(),
            smtp_password: Secret::new(env::var("SMTP_PASSWORD").unwrap_or_default()),
            from_email: env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "donations@example.org".to_string()),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Temple Donations".to_string()),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            paypal,
            email,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            service_name: "donation-service".to_string(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
