use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Stripe secret key (sk_xxx) for API calls (line-item expansion).
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret (whsec_xxx).
    pub stripe_webhook_secret: String,
    /// Lexoffice API key for invoice/credit-note generation.
    pub lexoffice_api_key: Option<String>,
    /// Resend API key for transactional email.
    pub resend_api_key: Option<String>,
    /// From address for customer-facing email.
    pub email_from: String,
    /// Address that receives internal order notifications.
    pub internal_notification_email: Option<String>,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("MOKKALAB_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "mokkalab.db".to_string()),
            base_url,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            lexoffice_api_key: env::var("LEXOFFICE_API_KEY").ok(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "bestellung@mokkalab.de".to_string()),
            internal_notification_email: env::var("INTERNAL_NOTIFICATION_EMAIL").ok(),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
