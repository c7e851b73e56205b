use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::client::OpenAiClient;
use crate::error::{AiError, Result};

/// Text produced by one assistant run.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub thread_id: String,
    pub run_id: String,
    pub text: String,
}

/// Error codes OpenAI reports on a failed run that clear up on their own.
const TRANSIENT_RUN_CODES: &[&str] = &["rate_limit_exceeded", "server_error"];

/// Post `message` to a fresh thread, run the assistant, and wait for its reply.
pub(crate) async fn run_to_completion(
    client: &OpenAiClient,
    assistant_id: &str,
    message: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<AssistantReply> {
    let thread = client.create_thread().await?;
    client.add_message(&thread.id, message).await?;
    let mut run = client.create_run(&thread.id, assistant_id).await?;

    info!(thread_id = %thread.id, run_id = %run.id, assistant_id, "Assistant run started");

    let started = Instant::now();
    while run.is_pending() {
        if started.elapsed() >= timeout {
            warn!(run_id = %run.id, elapsed_secs = started.elapsed().as_secs(), "Assistant run timed out");
            return Err(AiError::Timeout);
        }
        tokio::time::sleep(poll_interval).await;
        run = client.get_run(&thread.id, &run.id).await?;
        debug!(run_id = %run.id, status = %run.status, "Assistant run polled");
    }

    if run.status != "completed" {
        let (code, message) = run
            .last_error
            .as_ref()
            .map(|e| (e.code.clone(), e.message.clone()))
            .unwrap_or_default();
        let transient =
            run.status == "expired" || TRANSIENT_RUN_CODES.contains(&code.as_str());
        return Err(AiError::RunFailed {
            run_id: run.id,
            status: run.status,
            message: if code.is_empty() { message } else { format!("{code}: {message}") },
            transient,
        });
    }

    let messages = client.latest_messages(&thread.id).await?;
    let text = messages
        .data
        .iter()
        .filter(|m| m.role == "assistant")
        .find_map(|m| m.text())
        .map(str::to_string)
        .ok_or_else(|| AiError::Empty(format!("assistant produced no text on thread {}", thread.id)))?;

    Ok(AssistantReply {
        thread_id: thread.id,
        run_id: run.id,
        text,
    })
}
