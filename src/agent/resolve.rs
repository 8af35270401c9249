//! Per-request model selection.
//!
//! HTTP clients often send `auto` or omit the model on follow-up turns, while
//! the agent needs an explicit, stable model. The last explicitly requested
//! model is pinned for the lifetime of the server and reused according to the
//! precedence in [`resolve_model`].

use tokio::sync::RwLock;
use tracing::debug;

/// Model id meaning "let the server decide".
pub const AUTO_MODEL: &str = "auto";

/// Which precedence rule picked the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// The request named a concrete model.
    Explicit,
    /// Strict pinning reused the pinned model.
    StrictPin,
    /// The request's own (non-concrete) model id, e.g. `auto`.
    Requested,
    /// Non-strict fallback to the pinned model.
    Pin,
    /// The configured default.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub model: String,
    pub step: ResolutionStep,
    /// New pinning value, set only for explicit requests.
    pub pin: Option<String>,
}

/// Reduce `<provider>/<model>` to its last segment.
pub fn normalize_model(requested: &str) -> String {
    let trimmed = requested.trim();
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Pick the model for one request.
///
/// Precedence (the default-model fallback is a product choice and may change):
/// 1. a concrete requested model (pins it)
/// 2. the pinned model, under strict pinning
/// 3. the requested id even when it is `auto`
/// 4. the pinned model
/// 5. `default_model`
pub fn resolve_model(
    requested: Option<&str>,
    pinned: Option<&str>,
    strict: bool,
    default_model: &str,
) -> Resolution {
    let normalized = requested.map(normalize_model).filter(|m| !m.is_empty());
    let pinned = pinned.filter(|m| !m.is_empty());

    if let Some(model) = normalized.as_deref() {
        if model != AUTO_MODEL {
            return Resolution {
                model: model.to_string(),
                step: ResolutionStep::Explicit,
                pin: Some(model.to_string()),
            };
        }
    }

    let (model, step) = match (strict, pinned, normalized) {
        (true, Some(pin), _) => (pin.to_string(), ResolutionStep::StrictPin),
        (_, _, Some(requested)) => (requested, ResolutionStep::Requested),
        (_, Some(pin), None) => (pin.to_string(), ResolutionStep::Pin),
        (_, None, None) => (default_model.to_string(), ResolutionStep::Default),
    };
    Resolution {
        model,
        step,
        pin: None,
    }
}

/// Server-scoped pinning state.
///
/// Resolution and pin update happen under one write lock, so the pin follows
/// request arrival order rather than process completion order.
#[derive(Debug)]
pub struct ModelPinning {
    strict: bool,
    default_model: String,
    pinned: RwLock<Option<String>>,
}

impl ModelPinning {
    pub fn new(strict: bool, default_model: impl Into<String>) -> Self {
        Self {
            strict,
            default_model: default_model.into(),
            pinned: RwLock::new(None),
        }
    }

    pub async fn resolve(&self, requested: Option<&str>) -> Resolution {
        let mut pinned = self.pinned.write().await;
        let resolution = resolve_model(
            requested,
            pinned.as_deref(),
            self.strict,
            &self.default_model,
        );
        if let Some(pin) = &resolution.pin {
            *pinned = Some(pin.clone());
        }
        debug!(
            "Resolved model {:?} -> {} via {:?}",
            requested, resolution.model, resolution.step
        );
        resolution
    }

    pub async fn pinned(&self) -> Option<String> {
        self.pinned.read().await.clone()
    }
}
