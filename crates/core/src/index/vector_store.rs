//! A flat vector store with brute-force cosine similarity search.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use docchat_model::Embedding;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// One indexed document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Identifier of the source document.
    pub doc_id: String,
    /// Title of the source document.
    pub title: String,
    /// Model-derived summary of the document text.
    pub summary: String,
    /// Embedding of `summary`.
    pub embedding: Embedding,
}

impl IndexedDocument {
    /// Returns the passage handed to answer synthesis.
    pub(crate) fn passage(&self) -> String {
        if self.title.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n{}", self.title, self.summary)
        }
    }
}

/// A document matched by [`VectorStore::search`].
#[derive(Clone, Debug)]
pub struct SearchHit {
    /// The matched document.
    pub document: IndexedDocument,
    /// Cosine similarity between the query and the document.
    pub score: f32,
}

/// The contents of a document index.
///
/// All embeddings in a store come from the same model and have the same
/// number of dimensions. The store is saved as a single JSON file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    embedding_model: Option<String>,
    dimensions: usize,
    entries: Vec<IndexedDocument>,
}

impl VectorStore {
    /// Name of the file the store is persisted to.
    pub const FILE_NAME: &'static str = "docstore.json";

    /// Returns the path of the store file inside `dir`.
    #[inline]
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(Self::FILE_NAME)
    }

    /// Loads the store persisted in `dir`.
    ///
    /// A missing file yields an empty store.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no vector store at {}", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let store: Self = serde_json::from_reader(BufReader::new(file))?;
        store.validate()?;
        debug!(
            "loaded {} documents from {}",
            store.entries.len(),
            path.display()
        );
        Ok(store)
    }

    /// Writes the store to `dir`, replacing any previous file atomically.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(Self::path_in(dir)).map_err(|err| err.error)?;
        Ok(())
    }

    /// Replaces the whole contents of the store.
    pub fn replace(
        &mut self,
        embedding_model: &str,
        entries: Vec<IndexedDocument>,
    ) -> Result<()> {
        let dimensions = entries.first().map_or(0, |e| e.embedding.len());
        if let Some(bad) =
            entries.iter().find(|e| e.embedding.len() != dimensions)
        {
            return Err(Error::Index(format!(
                "document {} has {} dimensions, expected {dimensions}",
                bad.doc_id,
                bad.embedding.len()
            )));
        }

        self.embedding_model = Some(embedding_model.to_owned());
        self.dimensions = dimensions;
        self.entries = entries;
        Ok(())
    }

    /// Fails unless vectors from `embedding_model` with `dimensions` can be
    /// compared against this store.
    pub fn check_compatible(
        &self,
        embedding_model: &str,
        dimensions: usize,
    ) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        if self.embedding_model.as_deref() != Some(embedding_model) {
            return Err(Error::Index(format!(
                "index was built with embedding model {:?}, not {:?}",
                self.embedding_model.as_deref().unwrap_or_default(),
                embedding_model
            )));
        }
        if self.dimensions != dimensions {
            return Err(Error::Index(format!(
                "index has {} dimensions, query has {dimensions}",
                self.dimensions
            )));
        }
        Ok(())
    }

    /// Returns the `top_k` documents most similar to `query` whose score is
    /// at least `min_score`, best first.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (idx, cosine_similarity(query, &e.embedding)))
            .filter(|(_, score)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(idx, score)| SearchHit {
                document: self.entries[idx].clone(),
                score,
            })
            .collect()
    }

    /// Returns the documents in insertion order.
    #[inline]
    pub fn entries(&self) -> &[IndexedDocument] {
        &self.entries
    }

    /// Returns the number of documents.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no documents.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|e| e.embedding.len() != self.dimensions)
        {
            Some(bad) => Err(Error::Index(format!(
                "corrupted store: document {} has {} dimensions, expected {}",
                bad.doc_id,
                bad.embedding.len(),
                self.dimensions
            ))),
            None => Ok(()),
        }
    }
}

/// Returns 0.0 if the lengths differ or either vector is zero.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let mag_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let mag_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Embedding) -> IndexedDocument {
        IndexedDocument {
            doc_id: id.to_owned(),
            title: format!("Title {id}"),
            summary: format!("Summary {id}"),
            embedding,
        }
    }

    fn sample_store() -> VectorStore {
        let mut store = VectorStore::default();
        store
            .replace("test", vec![
                doc("a", vec![1.0, 0.0, 0.0]),
                doc("b", vec![0.7, 0.7, 0.0]),
                doc("c", vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_search_orders_and_filters() {
        let store = sample_store();

        let hits = store.search(&[1.0, 0.1, 0.0], 5, 0.1);
        let ids: Vec<_> =
            hits.iter().map(|h| h.document.doc_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(hits[0].score > hits[1].score);

        let hits = store.search(&[1.0, 0.1, 0.0], 1, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.doc_id, "a");
    }

    #[test]
    fn test_search_empty_store() {
        let store = VectorStore::default();
        assert!(store.search(&[1.0, 0.0], 2, 0.0).is_empty());
    }

    #[test]
    fn test_replace_rejects_mixed_dimensions() {
        let mut store = VectorStore::default();
        let docs = vec![doc("a", vec![1.0]), doc("b", vec![1.0, 0.0])];
        let err = store.replace("test", docs);
        assert!(matches!(err, Err(Error::Index(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_check_compatible() {
        let store = sample_store();
        assert!(store.check_compatible("test", 3).is_ok());
        assert!(matches!(
            store.check_compatible("other", 3),
            Err(Error::Index(_))
        ));
        assert!(matches!(
            store.check_compatible("test", 4),
            Err(Error::Index(_))
        ));
        assert!(VectorStore::default().check_compatible("any", 8).is_ok());
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = VectorStore::load(dir.path()).unwrap();
        assert!(missing.is_empty());

        let store = sample_store();
        store.persist(dir.path()).unwrap();
        let loaded = VectorStore::load(dir.path()).unwrap();
        assert_eq!(loaded, store);

        // Overwriting leaves exactly one store file behind.
        VectorStore::default().persist(dir.path()).unwrap();
        assert!(VectorStore::load(dir.path()).unwrap().is_empty());
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_load_corrupted_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            VectorStore::path_in(dir.path()),
            r#"{"embedding_model":"m","dimensions":2,"entries":[
                {"doc_id":"a","title":"","summary":"","embedding":[1.0]}
            ]}"#,
        )
        .unwrap();
        let err = VectorStore::load(dir.path());
        assert!(matches!(err, Err(Error::Index(_))));

        fs::write(VectorStore::path_in(dir.path()), "not json").unwrap();
        let err = VectorStore::load(dir.path());
        assert!(matches!(err, Err(Error::Json(_))));
    }
}
