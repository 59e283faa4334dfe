use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_bytes: i64,
    pub max_per_message: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Root directory for the local attachment file store.
    pub attachment_root: PathBuf,
    pub attachments: AttachmentPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.len() < 32 {
            return Err(crate::error::AppError::Config(
                "JWT_SECRET must be at least 32 bytes".into(),
            ));
        }

        let attachment_root = env::var("ATTACHMENT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/message_attachments"));

        let max_bytes = env::var("ATTACHMENT_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(25 * 1024 * 1024);
        let max_per_message = env::var("ATTACHMENT_MAX_PER_MESSAGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            attachment_root,
            attachments: AttachmentPolicy {
                max_bytes,
                max_per_message,
            },
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 3000,
            jwt_secret: "test-secret-test-secret-test-secret".into(),
            attachment_root: std::env::temp_dir().join("atelier_attachments_test"),
            attachments: AttachmentPolicy {
                max_bytes: 25 * 1024 * 1024,
                max_per_message: 10,
            },
        }
    }
}
