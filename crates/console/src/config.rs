use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use taskdeck_core::{EntityKind, IntervalPolicy, RenderLimits};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub server_url: String,
    pub view: EntityKind,
    pub base_interval_ms: u64,
    pub decay_step_ms: u64,
    pub backoff_factor: u32,
    pub max_rows: usize,
    pub max_output_chars: usize,
    pub job_log_preview_chars: usize,
    /// Initial filter query, e.g. `status=failed&batch=b1`.
    pub seed_query: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let limits = RenderLimits::default();
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            view: EntityKind::Tasks,
            base_interval_ms: 5000,
            decay_step_ms: 1000,
            backoff_factor: 10,
            max_rows: limits.max_rows,
            max_output_chars: limits.max_output_chars,
            job_log_preview_chars: limits.job_log_preview_chars,
            seed_query: None,
        }
    }
}

impl ConsoleConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: ConsoleConfig =
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn interval_policy(&self) -> IntervalPolicy {
        IntervalPolicy {
            base: Duration::from_millis(self.base_interval_ms),
            decay_step: Duration::from_millis(self.decay_step_ms),
            backoff_factor: self.backoff_factor.max(1),
        }
    }

    pub fn render_limits(&self) -> RenderLimits {
        RenderLimits {
            max_rows: self.max_rows,
            max_output_chars: self.max_output_chars,
            job_log_preview_chars: self.job_log_preview_chars,
        }
    }

    /// Decoded `key=value` pairs of the seed query.
    pub fn seed_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.seed_query.as_deref() else {
            return Vec::new();
        };
        let query = query.trim_start_matches('?');
        match reqwest::Url::parse(&format!("http://seed.invalid/?{query}")) {
            Ok(url) => url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: ConsoleConfig = toml::from_str(
            r#"
            server_url = "http://scitq:5000"
            view = "workers"
            base_interval_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.view, EntityKind::Workers);
        assert_eq!(cfg.interval_policy().base, Duration::from_millis(2000));
        assert_eq!(cfg.interval_policy().decay_step, Duration::from_millis(1000));
        assert_eq!(cfg.render_limits().max_rows, 500);
    }

    #[test]
    fn seed_query_is_decoded() {
        let cfg = ConsoleConfig {
            seed_query: Some("?status=failed&batch=my%20batch".into()),
            ..ConsoleConfig::default()
        };
        assert_eq!(
            cfg.seed_pairs(),
            vec![
                ("status".to_string(), "failed".to_string()),
                ("batch".to_string(), "my batch".to_string())
            ]
        );
    }
}
