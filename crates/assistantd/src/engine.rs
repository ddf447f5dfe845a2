//! InferenceEngine seam and the subprocess-backed reference engine.
//!
//! The engine is an external collaborator: the session layer only needs a
//! lazy, finite chunk stream per prompt and a context reset between
//! sessions. `CommandEngine` fulfills the contract by shelling out to a
//! generator process once per request and streaming its stdout.

use std::process::Stdio;

use futures::stream::BoxStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Lazy, finite sequence of generated text chunks for one request.
pub type TokenStream = BoxStream<'static, Result<String, EngineError>>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn generator process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("generator i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("generation failed: {0}")]
    Generation(String),
}

#[async_trait::async_trait]
pub trait InferenceEngine: Send + Sync + 'static {
    /// Produce the chunk stream for one prompt.
    ///
    /// The caller must drive the stream to completion even if the peer has
    /// stopped listening, so engine state is consistent for the next
    /// `reset`.
    async fn generate(&self, prompt: &str) -> Result<TokenStream, EngineError>;

    /// Clear conversational/context state between sessions.
    async fn reset(&self) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Generator program invoked once per request.
    pub program: String,
    pub args: Vec<String>,
    /// Template applied to the request text; `{prompt}` is substituted.
    pub prompt_template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "llama-cli".to_string(),
            args: Vec::new(),
            prompt_template: "Q: {prompt}. A: ".to_string(),
        }
    }
}

/// Engine that runs an external generator process per request.
///
/// The templated prompt is written to the child's stdin; stdout is streamed
/// back in chunks. One process per request carries no conversational state,
/// so `reset` has nothing to clear.
pub struct CommandEngine {
    config: EngineConfig,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn render_prompt(&self, prompt: &str) -> String {
        self.config.prompt_template.replace("{prompt}", prompt)
    }
}

#[async_trait::async_trait]
impl InferenceEngine for CommandEngine {
    async fn generate(&self, prompt: &str) -> Result<TokenStream, EngineError> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Generation("generator stdout not captured".into()))?;
        let rendered = self.render_prompt(prompt);

        let (tx, rx) = mpsc::channel::<Result<String, EngineError>>(16);
        tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(rendered.as_bytes()).await {
                    tracing::warn!(error = %e, "failed to write prompt to generator stdin");
                }
                // stdin drops here so the generator sees EOF
            }

            let mut buf = [0u8; 512];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(EngineError::Io(e))).await;
                        break;
                    }
                }
            }

            match child.wait().await {
                Ok(status) => tracing::debug!(%status, "generator process exited"),
                Err(e) => tracing::warn!(error = %e, "failed to reap generator process"),
            }
        });

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn reset(&self) -> Result<(), EngineError> {
        // Nothing held between requests; the reset is still logged so the
        // session lifecycle reads the same for every engine.
        tracing::debug!("command engine reset (no persistent context)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn prompt_template_substitutes_request_text() {
        let engine = CommandEngine::new(EngineConfig::default());
        assert_eq!(engine.render_prompt("Ping"), "Q: Ping. A: ");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_engine_streams_generator_stdout() {
        let engine = CommandEngine::new(EngineConfig {
            program: "cat".to_string(),
            args: Vec::new(),
            prompt_template: "Q: {prompt}. A: ".to_string(),
        });

        let mut chunks = engine.generate("Ping").await.unwrap();
        let mut out = String::new();
        while let Some(chunk) = chunks.next().await {
            out.push_str(&chunk.unwrap());
        }

        assert_eq!(out, "Q: Ping. A: ");
        engine.reset().await.unwrap();
    }

    #[tokio::test]
    async fn missing_generator_program_is_a_spawn_error() {
        let engine = CommandEngine::new(EngineConfig {
            program: "definitely-not-a-real-generator".to_string(),
            ..Default::default()
        });

        let err = match engine.generate("Ping").await {
            Ok(_) => panic!("expected generate to fail"),
            Err(err) => err,
        };
        assert!(matches!(err, EngineError::Spawn(_)));
    }
}
