use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub github_token: String,
    pub telegram_bot_token: String,
    /// Root directory for per-job scratch files (downloaded archives,
    /// extraction directories).
    pub temp_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            github_token: env::var("GITHUB_TOKEN").context("GITHUB_TOKEN must be set")?,
            telegram_bot_token: env::var("BOT_TOKEN").context("BOT_TOKEN must be set")?,
            temp_dir: env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("repo-ops")),
        })
    }
}

/// Per-plan admission limits, checked by the enqueuing front-ends
/// before a job is accepted. A value of -1 means unlimited.
#[derive(Debug, Clone, Copy)]
pub struct PlanLimits {
    pub max_repos: i64,
    pub max_archive_bytes: i64,
    pub max_api_calls: i64,
}

impl PlanLimits {
    pub fn for_plan(plan: &str) -> Self {
        match plan {
            "pro" => Self {
                max_repos: 50,
                max_archive_bytes: 100 * 1024 * 1024,
                max_api_calls: 1000,
            },
            "enterprise" => Self {
                max_repos: -1,
                max_archive_bytes: 500 * 1024 * 1024,
                max_api_calls: -1,
            },
            _ => Self {
                max_repos: 5,
                max_archive_bytes: 10 * 1024 * 1024,
                max_api_calls: 100,
            },
        }
    }

    pub fn allows_api_call(&self, used: i64) -> bool {
        self.max_api_calls < 0 || used < self.max_api_calls
    }

    pub fn allows_repo(&self, created: i64) -> bool {
        self.max_repos < 0 || created < self.max_repos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_caps_repos_at_five() {
        let limits = PlanLimits::for_plan("free");
        assert!(limits.allows_repo(4));
        assert!(!limits.allows_repo(5));
    }

    #[test]
    fn enterprise_plan_is_unlimited() {
        let limits = PlanLimits::for_plan("enterprise");
        assert!(limits.allows_repo(10_000));
        assert!(limits.allows_api_call(10_000));
    }

    #[test]
    fn unknown_plan_falls_back_to_free() {
        let limits = PlanLimits::for_plan("something-else");
        assert_eq!(limits.max_repos, 5);
    }
}
