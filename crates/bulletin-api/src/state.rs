use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use bulletin_db::Database;

use crate::error::AppError;
use crate::session::Authenticator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: Authenticator,
    pub web: WebSettings,
}

/// Settings that only affect how responses are shaped.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub redirect_after_login: String,
    pub secure_cookies: bool,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            redirect_after_login: "/messages".into(),
            secure_cookies: false,
        }
    }
}

/// Runs blocking store work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&AppStateInner) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Internal(anyhow!("blocking task failed"))
        })?
}
