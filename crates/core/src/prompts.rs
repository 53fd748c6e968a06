//! Prompt templates.
//!
//! Placeholders are written as `{name}` and filled with [`render`].

/// System prompt for answering strictly from provided context.
pub const QA_SYSTEM: &str = "\
You are a trusted question answering system. Answer queries using only the \
contextual information provided, without prior knowledge.
Follow these rules:
1. Never refer to the context directly in your answer.
2. Avoid phrases like 'based on the context' or 'the context information'.";

/// Answers `{query_str}` from `{context_str}`, used by tree summarize.
pub const TREE_SUMMARIZE: &str = "\
Context information from multiple sources is provided below.
---------------------
{context_str}
---------------------
Answer the question using information from these sources, not prior \
knowledge. If uncertain, respond with 'no information'.
Query: {query_str}
Answer: ";

/// The phrase the model is told to answer with when the context is not
/// enough.
pub const NO_INFORMATION: &str = "no information";

/// Asks the model to summarize the document text it is given.
pub const SUMMARY_QUERY: &str = "Summarize the content of the text provided.";

/// Wraps a document's text with [`SUMMARY_QUERY`].
pub const DOCUMENT_SUMMARY: &str = "\
{document}

{summary_query}";

/// Asks the model to pick relevant documents out of numbered summaries.
pub const CHOICE_SELECT: &str = "\
A list of documents is shown below. Each document has a number next to it \
along with a summary of the document. A question is also provided.
Respond with the numbers of the documents you should consult to answer the \
question, in order of relevance, as well as the relevance score. The \
relevance score is a number from 1-10 based on how relevant you think the \
document is to the question.
Do not include any documents that are not relevant to the question.
Example format:
Document 1:
<summary of document 1>

Document 2:
<summary of document 2>

...

Document 10:
<summary of document 10>

Question: <question>
Answer:
Doc: 9, Relevance: 7
Doc: 3, Relevance: 4
Doc: 7, Relevance: 3

Let's try this now:

{context_str}
Question: {query_str}
Answer:
";

/// Decides whether a message needs a document lookup.
pub const RETRIEVAL_ROUTER: &str = "\
You route messages for an assistant that can search a private document \
collection. Reply with exactly 'yes' if answering the user's message needs \
facts from those documents, or exactly 'no' if it is small talk, a \
follow-up about the conversation itself, or general knowledge.";

/// The user turn sent to the model when document context was found.
pub const AUGMENTED_USER_MESSAGE: &str = "\
Relevant information from the document collection:
---------------------
{context_str}
---------------------
{query_str}";

/// Asks for the conversation summary as JSON.
pub const CONVERSATION_SUMMARY: &str = "\
Summarize the conversation so far. Respond with a single JSON object \
matching this JSON schema, and nothing else:
{schema}";

/// Replaces every `{name}` placeholder of `template` with its value.
///
/// The template is scanned once, so placeholders appearing inside the
/// substituted values are left as they are. Unknown placeholders are
/// kept verbatim.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let tail = &rest[start..];
        let value = tail.find('}').and_then(|end| {
            let name = &tail[1..end];
            vars.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                rendered.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}
