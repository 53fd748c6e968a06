use std::sync::Arc;

use docchat_model::{Embedding, EmbeddingProvider, ErrorKind};
use reqwest::Client;

use crate::proto::{self, EmbeddingResponse};
use crate::{Error, OpenAIConfig, authorized_post, check_response};

/// OpenAI-compatible embedding provider.
///
/// Usually obtained from [`crate::OpenAIProvider::embedding_provider`].
#[derive(Clone, Debug)]
pub struct OpenAIEmbeddingProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIEmbeddingProvider {
    #[inline]
    pub(crate) fn new(client: Client, config: Arc<OpenAIConfig>) -> Self {
        Self { client, config }
    }
}

impl EmbeddingProvider for OpenAIEmbeddingProvider {
    type Error = Error;

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }

    fn embed(
        &self,
        inputs: &[String],
    ) -> impl Future<Output = Result<Vec<Embedding>, Self::Error>> + Send + 'static
    {
        let expected = inputs.len();
        let body = proto::create_embedding_request(inputs, &self.config);
        let resp_fut =
            authorized_post(&self.client, &self.config, "/embeddings")
                .json(&body)
                .send();

        async move {
            if expected == 0 {
                return Ok(vec![]);
            }
            let resp = check_response(resp_fut.await).await?;
            let resp = resp
                .json::<EmbeddingResponse>()
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
            collect_embeddings(resp, expected)
        }
    }
}

fn collect_embeddings(
    mut resp: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Embedding>, Error> {
    if resp.data.len() != expected {
        return Err(Error::new(
            format!(
                "expected {expected} embeddings, got {}",
                resp.data.len()
            ),
            ErrorKind::Other,
        ));
    }
    resp.data.sort_by_key(|d| d.index);
    trace!("received {expected} embeddings");
    Ok(resp.data.into_iter().map(|d| d.embedding).collect())
}
