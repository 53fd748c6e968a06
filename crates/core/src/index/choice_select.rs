//! Document selection by asking the model to pick from numbered summaries.

use docchat_model::{ModelMessage, ModelRequest};

use super::vector_store::IndexedDocument;
use crate::error::Result;
use crate::model_client::ModelClient;
use crate::prompts;

/// A document picked by the model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Choice {
    /// Zero-based position of the document in the candidate list.
    pub position: usize,
    pub relevance: f32,
}

/// Asks the model which of `documents` help answer `query`.
///
/// Documents are presented `batch_size` at a time. The result is ordered
/// by relevance and holds at most `top_k` choices.
pub(crate) async fn select(
    model: &ModelClient,
    documents: &[IndexedDocument],
    query: &str,
    batch_size: usize,
    top_k: usize,
    temperature: Option<f32>,
) -> Result<Vec<Choice>> {
    let batch_size = batch_size.max(1);
    let mut choices = vec![];
    for (batch_idx, batch) in documents.chunks(batch_size).enumerate() {
        let prompt = prompts::render(
            prompts::CHOICE_SELECT,
            &[("context_str", &format_batch(batch)), ("query_str", query)],
        );
        let req = ModelRequest {
            messages: vec![ModelMessage::User(prompt)],
            temperature,
            ..Default::default()
        };
        let reply = model.complete(req, |_| {}).await?;

        let offset = batch_idx * batch_size;
        let picked = parse_choices(&reply, batch.len());
        trace!("batch {batch_idx}: model picked {picked:?}");
        choices.extend(picked.into_iter().map(|c| Choice {
            position: c.position + offset,
            ..c
        }));
    }

    // Stable, so ties keep the presentation order.
    choices.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    choices.truncate(top_k);
    Ok(choices)
}

/// Numbers the documents starting from 1.
fn format_batch(documents: &[IndexedDocument]) -> String {
    let mut text = String::new();
    for (idx, doc) in documents.iter().enumerate() {
        let passage = doc.passage();
        text.push_str(&format!("Document {}:\n{passage}\n\n", idx + 1));
    }
    text
}

/// Parses `Doc: <n>, Relevance: <score>` lines.
///
/// Lines that don't follow the format, numbers outside `1..=num_docs` and
/// repeated numbers are skipped. Positions in the result are zero-based.
pub(crate) fn parse_choices(reply: &str, num_docs: usize) -> Vec<Choice> {
    let mut choices: Vec<Choice> = vec![];
    for line in reply.lines() {
        let Some((doc_part, relevance_part)) = line.split_once(',') else {
            continue;
        };
        let Some(number) = field_value(doc_part, "doc")
            .and_then(|v| v.parse::<usize>().ok())
        else {
            continue;
        };
        if number == 0 || number > num_docs {
            continue;
        }
        let position = number - 1;
        if choices.iter().any(|c| c.position == position) {
            continue;
        }
        let relevance = field_value(relevance_part, "relevance")
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.0);
        choices.push(Choice {
            position,
            relevance,
        });
    }
    choices
}

fn field_value<'a>(part: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = part.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case(name) {
        return None;
    }
    Some(value.trim().trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use docchat_test_model::TestModelProvider;

    use super::*;

    fn docs(count: usize) -> Vec<IndexedDocument> {
        (0..count)
            .map(|i| IndexedDocument {
                doc_id: i.to_string(),
                title: String::new(),
                summary: format!("summary {i}"),
                embedding: vec![],
            })
            .collect()
    }

    #[test]
    fn test_parse_choices() {
        let reply = "Doc: 9, Relevance: 7\n\
                     Doc: 3, Relevance: 4\n\
                     doc:7 , relevance: 3.5\n\
                     I think these are the relevant ones.\n\
                     Doc: 3, Relevance: 10\n\
                     Doc: 11, Relevance: 9\n\
                     Doc: 0, Relevance: 9\n\
                     Doc: two, Relevance: 9";
        let choices = parse_choices(reply, 10);
        assert_eq!(choices, [
            Choice {
                position: 8,
                relevance: 7.0
            },
            Choice {
                position: 2,
                relevance: 4.0
            },
            Choice {
                position: 6,
                relevance: 3.5
            },
        ]);

        assert!(parse_choices("None of the documents.", 10).is_empty());
        assert!(parse_choices("", 10).is_empty());
    }

    #[test]
    fn test_missing_relevance() {
        let choices = parse_choices("Doc: 2, Relevance: high", 3);
        assert_eq!(choices, [Choice {
            position: 1,
            relevance: 0.0
        }]);
    }

    #[tokio::test]
    async fn test_select_batches() {
        let mut provider = TestModelProvider::default();
        provider
            .add_text_response("Doc: 2, Relevance: 3\nDoc: 1, Relevance: 9");
        provider
            .add_text_response("Doc: 1, Relevance: 5\nDoc: 4, Relevance: 9");
        let inspector = provider.clone();
        let model = ModelClient::new(provider);

        let documents = docs(3);
        let choices = select(&model, &documents, "q", 2, 2, None)
            .await
            .unwrap();
        let positions: Vec<_> = choices.iter().map(|c| c.position).collect();
        // The second batch only has one document, so "Doc: 4" is dropped.
        assert_eq!(positions, [0, 2]);

        let requests = inspector.requests();
        assert_eq!(requests.len(), 2);
        let first = requests[0].messages[0].content();
        assert!(first.contains("Document 1:\nsummary 0"));
        assert!(first.contains("Document 2:\nsummary 1"));
        let second = requests[1].messages[0].content();
        assert!(second.contains("Document 1:\nsummary 2"));
        assert!(second.contains("Question: q"));
    }
}
