//! Answer synthesis over retrieved passages.

use docchat_model::{ModelMessage, ModelRequest};

use crate::error::Result;
use crate::model_client::ModelClient;
use crate::prompts;

/// Answers `query` from `passages` with the tree-summarize procedure.
///
/// Passages are packed into chunks of at most `max_chars` characters and
/// each chunk is answered separately. While more than one answer is left,
/// the answers become the passages of the next round.
pub(crate) async fn tree_summarize(
    model: &ModelClient,
    passages: Vec<String>,
    query: &str,
    max_chars: usize,
    temperature: Option<f32>,
) -> Result<String> {
    let mut texts = passages;
    let mut round = 0;
    loop {
        let chunks = pack_chunks(&texts, max_chars);
        trace!(
            "tree summarize round {round}: {} passages in {} chunks",
            texts.len(),
            chunks.len()
        );
        if round > 0 && chunks.len() >= texts.len() {
            // The answers are too long to be merged any further.
            debug!("tree summarize stopped shrinking, merging all answers");
            let context = texts.join("\n\n");
            return answer(model, &context, query, temperature).await;
        }

        let mut answers = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            answers.push(answer(model, chunk, query, temperature).await?);
        }
        if answers.len() <= 1 {
            return Ok(answers.pop().unwrap_or_default());
        }
        texts = answers;
        round += 1;
    }
}

async fn answer(
    model: &ModelClient,
    context: &str,
    query: &str,
    temperature: Option<f32>,
) -> Result<String> {
    let prompt = prompts::render(
        prompts::TREE_SUMMARIZE,
        &[("context_str", context), ("query_str", query)],
    );
    let req = ModelRequest {
        messages: vec![
            ModelMessage::System(prompts::QA_SYSTEM.to_owned()),
            ModelMessage::User(prompt),
        ],
        temperature,
        ..Default::default()
    };
    let reply = model.complete(req, |_| {}).await?;
    Ok(reply.trim().to_owned())
}

/// Groups consecutive texts into chunks no longer than `max_chars`.
///
/// A text longer than `max_chars` forms a chunk of its own.
fn pack_chunks(texts: &[String], max_chars: usize) -> Vec<String> {
    const SEPARATOR: &str = "\n\n";

    let mut chunks = vec![];
    let mut current = String::new();
    let mut current_chars = 0;
    for text in texts {
        let chars = text.chars().count();
        if !current.is_empty()
            && current_chars + SEPARATOR.len() + chars > max_chars
        {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push_str(SEPARATOR);
            current_chars += SEPARATOR.len();
        }
        current.push_str(text);
        current_chars += chars;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Returns `true` if `answer` is the "no information" phrase.
///
/// Case and surrounding punctuation are ignored.
pub(crate) fn is_no_information(answer: &str) -> bool {
    let trimmed = answer
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    trimmed.eq_ignore_ascii_case(prompts::NO_INFORMATION)
}
