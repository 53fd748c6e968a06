//! Reading the document collection.

use std::sync::Arc;

use async_trait::async_trait;
use docchat_core::{DocumentRecord, DocumentSource};
use rusqlite::types::Value as SqlValue;
use rusqlite::{ToSql, params_from_iter};
use serde_json::{Map, Number, Value};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::ident;

/// A [`DocumentSource`] that reads selected columns of a SQLite table.
///
/// Each row becomes one [`DocumentRecord`] identified by its `rowid`.
#[derive(Clone, Debug)]
pub struct SqliteDocumentSource {
    db: Arc<Database>,
    collection: String,
    fields: Vec<String>,
    filter: Option<(String, String)>,
}

impl SqliteDocumentSource {
    /// Reads `fields` of every row in `collection`.
    pub fn new<S: AsRef<str>>(
        db: Arc<Database>,
        collection: &str,
        fields: &[S],
    ) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::NoFields);
        }
        ident::quoted(collection)?;
        for field in fields {
            ident::quoted(field.as_ref())?;
        }
        Ok(Self {
            db,
            collection: collection.to_owned(),
            fields: fields.iter().map(|f| f.as_ref().to_owned()).collect(),
            filter: None,
        })
    }

    /// Only reads rows whose `field` equals `value`.
    pub fn with_filter(
        mut self,
        field: &str,
        value: impl Into<String>,
    ) -> Result<Self> {
        ident::quoted(field)?;
        self.filter = Some((field.to_owned(), value.into()));
        Ok(self)
    }

    fn select_sql(&self) -> Result<String> {
        let columns = self
            .fields
            .iter()
            .map(|f| ident::quoted(f))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let mut sql = format!(
            "SELECT rowid, {columns} FROM {}",
            ident::quoted(&self.collection)?
        );
        if let Some((field, _)) = &self.filter {
            sql.push_str(&format!(" WHERE {} = ?1", ident::quoted(field)?));
        }
        sql.push_str(" ORDER BY rowid");
        Ok(sql)
    }

    fn load_blocking(&self) -> Result<Vec<DocumentRecord>> {
        let sql = self.select_sql()?;
        let params: Vec<&dyn ToSql> = match &self.filter {
            Some((_, value)) => vec![value as &dyn ToSql],
            None => vec![],
        };

        let documents = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params))?;
            let mut documents = vec![];
            while let Some(row) = rows.next()? {
                let rowid: i64 = row.get(0)?;
                let mut fields = Map::new();
                for (idx, name) in self.fields.iter().enumerate() {
                    let value: SqlValue = row.get(idx + 1)?;
                    fields.insert(name.clone(), to_json(value));
                }
                documents.push(DocumentRecord {
                    id: rowid.to_string(),
                    title: text_field(&fields, "title"),
                    summary: text_field(&fields, "summary"),
                    fields,
                });
            }
            Ok(documents)
        })?;
        debug!(
            "loaded {} documents from {}",
            documents.len(),
            self.collection
        );
        Ok(documents)
    }
}

#[async_trait]
impl DocumentSource for SqliteDocumentSource {
    async fn load(&self) -> docchat_core::Result<Vec<DocumentRecord>> {
        let this = self.clone();
        let documents =
            tokio::task::spawn_blocking(move || this.load_blocking())
                .await
                .map_err(Error::from)??;
        Ok(documents)
    }
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => {
            Number::from_f64(f).map_or(Value::Null, Value::Number)
        }
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => {
            Value::String(String::from_utf8_lossy(&b).into_owned())
        }
    }
}

fn text_field(fields: &Map<String, Value>, name: &str) -> String {
    match fields.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
