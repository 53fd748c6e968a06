use crate::provider::ModelProviderError;

/// A dense vector representing a piece of text.
pub type Embedding = Vec<f32>;

/// A type that turns texts into embeddings.
///
/// Like [`crate::ModelProvider`], the provider should behave like a
/// stateless object.
pub trait EmbeddingProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Returns the name of the embedding model.
    ///
    /// Vectors from different models are not comparable, so stores use
    /// this name to detect stale data.
    fn model_name(&self) -> &str;

    /// Embeds the inputs.
    ///
    /// The returned vector has exactly one embedding per input, in the
    /// same order.
    fn embed(
        &self,
        inputs: &[String],
    ) -> impl Future<Output = Result<Vec<Embedding>, Self::Error>> + Send + 'static;
}
