//! Model listing: `--list-models` output parsing and the TTL cache.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::AgentError;

/// How long a fetched model list is served without asking the agent again.
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
}

fn model_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9._:/-]+)\s+-\s+(.+)$").expect("model line regex is valid")
    })
}

fn trailing_note_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("note regex is valid"))
}

/// Parse `<id> - <description>` lines. Anything else is ignored.
///
/// A repeated id replaces the earlier entry and moves to the end.
pub fn parse_model_list(raw: &str) -> Vec<ModelDescriptor> {
    let mut models: Vec<ModelDescriptor> = Vec::new();
    for line in raw.lines() {
        let Some(caps) = model_line_regex().captures(line.trim()) else {
            continue;
        };
        let id = caps[1].to_string();
        let description = caps[2].trim();
        let stripped = trailing_note_regex().replace(description, "");
        let display_name = if stripped.trim().is_empty() {
            description.to_string()
        } else {
            stripped.trim().to_string()
        };
        models.retain(|m| m.id != id);
        models.push(ModelDescriptor { id, display_name });
    }
    models
}

/// Where the catalog gets a fresh model list from.
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, AgentError>;
}

#[derive(Debug, Clone)]
struct ModelCache {
    fetched_at: Instant,
    models: Vec<ModelDescriptor>,
}

/// Server-scoped model list cache.
///
/// The lock is held across the upstream fetch so concurrent requests on an
/// expired cache share a single invocation.
pub struct ModelCatalog {
    ttl: Duration,
    cache: Mutex<Option<ModelCache>>,
}

impl ModelCatalog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Cached models if fresh, otherwise fetch from `source` and replace the cache.
    ///
    /// A failed fetch leaves any previous cache untouched.
    pub async fn models(&self, source: &dyn ModelSource) -> Result<Vec<ModelDescriptor>, AgentError> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                debug!("Serving {} cached models", entry.models.len());
                return Ok(entry.models.clone());
            }
        }

        let models = source.fetch_models().await?;
        debug!("Fetched {} models from agent", models.len());
        *cache = Some(ModelCache {
            fetched_at: Instant::now(),
            models: models.clone(),
        });
        Ok(models)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(MODEL_CACHE_TTL)
    }
}
