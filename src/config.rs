use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub db_path: Option<String>,
    pub bind_addr: Option<String>,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub reap_after_secs: Option<u64>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("ZAPQ_").from_env::<Self>()?)
    }

    /// Database file path; `None` selects an in-memory database.
    pub fn db_path(&self) -> Option<&str> {
        self.db_path.as_deref()
    }

    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or("127.0.0.1:8080")
    }

    pub fn gateway_url(&self) -> &str {
        self.gateway_url.as_deref().unwrap_or("http://127.0.0.1:21465")
    }

    pub fn gateway_token(&self) -> Option<&str> {
        self.gateway_token.as_deref()
    }

    /// Age after which an orphaned `processing` message is released back to
    /// `pending` by the dispatcher's reaper.
    pub fn reap_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reap_after_secs.unwrap_or(600) as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            bind_addr: None,
            gateway_url: None,
            gateway_token: None,
            reap_after_secs: None,
        }
    }
}
