//! Script sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shortreel_common::clock::frame_interval_secs;
use shortreel_common::error::{ReelError, ReelResult};
use shortreel_script_model::Script;

use crate::request::{build_prompt, ScriptRequest};
use crate::response::parse_generated;
use crate::rotation::{CredentialPool, RetryPolicy};

/// Produces a validated script for a request.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn generate(&self, request: &ScriptRequest) -> ReelResult<Script>;

    /// Source name for logs.
    fn name(&self) -> &str;
}

/// A text-generation service, called with one API key at a time.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Raw reply text for `prompt`.
    async fn complete(&self, api_key: &str, prompt: &str) -> ReelResult<String>;

    fn name(&self) -> &str;
}

/// Validation tolerance used when no frame rate is known (one frame at 30 fps).
fn default_tolerance() -> f64 {
    frame_interval_secs(30)
}

fn validated(script: Script, tolerance: f64, source: &str) -> ReelResult<Script> {
    let warnings = script.validate(tolerance)?;
    for warning in &warnings {
        tracing::warn!(source, script_id = %script.id, "{warning}");
    }
    Ok(script)
}

/// Reads a script that already exists on disk. The request is only logged.
#[derive(Debug, Clone)]
pub struct FileScriptSource {
    path: PathBuf,
    tolerance: f64,
}

impl FileScriptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tolerance: default_tolerance(),
        }
    }

    pub fn with_tolerance(mut self, secs: f64) -> Self {
        self.tolerance = secs;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ScriptSource for FileScriptSource {
    async fn generate(&self, request: &ScriptRequest) -> ReelResult<Script> {
        tracing::debug!(path = %self.path.display(), topic = %request.topic, "Loading script from file");
        let text = tokio::fs::read_to_string(&self.path).await?;
        let script = Script::from_json(&text)?;
        validated(script, self.tolerance, self.name())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Prompts a [`GenerationBackend`], rotating through API keys on failure.
///
/// A reply that is empty, unparseable, or structurally invalid counts as a
/// failed attempt, so the next key gets a chance.
pub struct GeneratedScriptSource<B> {
    backend: B,
    pool: CredentialPool,
    policy: RetryPolicy,
    tolerance: f64,
}

impl<B: GenerationBackend> GeneratedScriptSource<B> {
    pub fn new(backend: B, pool: CredentialPool) -> Self {
        Self {
            backend,
            pool,
            policy: RetryPolicy::default(),
            tolerance: default_tolerance(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tolerance(mut self, secs: f64) -> Self {
        self.tolerance = secs;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn attempt(&self, api_key: &str, prompt: &str, request: &ScriptRequest) -> ReelResult<Script> {
        let reply = self.backend.complete(api_key, prompt).await?;
        if reply.trim().is_empty() {
            return Err(ReelError::script_source("empty reply"));
        }
        let script = parse_generated(&reply, request, chrono::Utc::now())?;
        validated(script, self.tolerance, self.backend.name())
    }
}

#[async_trait]
impl<B: GenerationBackend> ScriptSource for GeneratedScriptSource<B> {
    async fn generate(&self, request: &ScriptRequest) -> ReelResult<Script> {
        if request.topic.trim().is_empty() {
            return Err(ReelError::script_source("topic must not be empty"));
        }
        tracing::info!(
            backend = self.backend.name(),
            topic = %request.topic,
            style = %request.style,
            target_duration = request.target_duration,
            keys = self.pool.len(),
            "Generating script"
        );

        let prompt = build_prompt(request);
        let script = self
            .policy
            .run(&self.pool, |key| {
                let prompt = &prompt;
                async move { self.attempt(&key, prompt, request).await }
            })
            .await?;

        tracing::info!(
            script_id = %script.id,
            title = %script.title,
            duration_secs = script.total_duration,
            scenes = script.scenes.len(),
            captions = script.captions.len(),
            "Script generated"
        );
        Ok(script)
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}
