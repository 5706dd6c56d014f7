//! Answer orchestration: prompt assembly, generation, and confidence.
//!
//! Retrieved chunks arrive ordered by descending similarity. Chunks are
//! admitted into the prompt in that order until the configured context
//! budget is reached; the rest are dropped and do not appear in the answer's
//! sources or its confidence. With no retrieved context the orchestrator
//! answers directly without calling the generation backend, so it cannot
//! fabricate sources.

use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::error::RagError;
use crate::generate::{generate_with_timeout, GenerationRequest, Generator};
use crate::models::{Answer, QueryParams, RetrievedChunk, SourceRef};

/// Answer returned when retrieval produced no context.
pub const NO_CONTEXT_ANSWER: &str = "I don't know based on the indexed documents.";

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Use the provided CONTEXT strictly. \
     If the answer isn't in the context, say you don't know.";

/// Produce an [`Answer`] for already-retrieved context.
///
/// Side-effect free apart from the external generation call; never touches
/// the index.
pub async fn answer(
    config: &Config,
    generator: &dyn Generator,
    params: &QueryParams,
    retrieved: Vec<RetrievedChunk>,
) -> Result<Answer, RagError> {
    if retrieved.is_empty() {
        return Ok(Answer {
            answer: NO_CONTEXT_ANSWER.to_string(),
            sources: Vec::new(),
            overall_confidence: 0.0,
        });
    }

    let used = select_within_budget(retrieved, config.retrieval.context_budget_chars);
    debug!(used = used.len(), "assembling prompt");

    let prompt = assemble_prompt(&params.question, &used);
    let request = GenerationRequest {
        prompt,
        max_tokens: params.num_predict.unwrap_or(config.generation.num_predict),
        device_hint: params.num_gpu.unwrap_or(config.generation.num_gpu),
        temperature: params.temperature.unwrap_or(config.generation.temperature),
    };
    let timeout = Duration::from_secs(config.generation.timeout_secs);

    let text = generate_with_timeout(generator, &request, timeout).await?;

    let sources: Vec<SourceRef> = used
        .iter()
        .map(|hit| SourceRef {
            path: hit.path.clone(),
            chunk_id: hit.chunk.id.clone(),
            score: hit.score,
            confidence: hit.score.clamp(0.0, 1.0),
        })
        .collect();

    let overall_confidence = sources
        .iter()
        .map(|s| s.confidence)
        .fold(0.0f32, f32::max);

    Ok(Answer {
        answer: text,
        sources,
        overall_confidence,
    })
}

/// Admit chunks in descending-similarity order until the character budget
/// is exceeded; the remainder is dropped. The highest-similarity chunk is
/// always admitted so the prompt is never empty.
fn select_within_budget(retrieved: Vec<RetrievedChunk>, budget_chars: usize) -> Vec<RetrievedChunk> {
    let mut used = Vec::new();
    let mut total = 0usize;
    for hit in retrieved {
        let len = hit.chunk.text.chars().count();
        if !used.is_empty() && total + len > budget_chars {
            break;
        }
        total += len;
        used.push(hit);
    }
    used
}

/// Prompt layout consumed by the generation backend.
fn assemble_prompt(question: &str, used: &[RetrievedChunk]) -> String {
    let context_block = used
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("Snippet {}:\n{}", i + 1, hit.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "SYSTEM:\n{}\n\nCONTEXT:\n{}\n\nUSER QUESTION:\n{}\n\nASSISTANT:",
        SYSTEM_INSTRUCTION, context_block, question
    )
}
