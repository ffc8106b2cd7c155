use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, doc};
use thiserror::Error;
use tracing::debug;

use crate::model::Record;

/// Smallest writer heap tantivy accepts per indexing thread, plus headroom.
const WRITER_HEAP_BYTES: usize = 20_000_000;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search index: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("schema missing field {0}")]
    MissingField(&'static str),
}

#[derive(Clone, Copy, Debug)]
pub struct Fields {
    pub id: Field,
    pub title: Field,
}

/// In-memory index over record titles, keyed by record id.
///
/// Rebuilt from scratch on every list refresh and never mutated afterwards,
/// so a built index always describes exactly one collection.
pub struct RecordIndex {
    index: Index,
    reader: IndexReader,
    pub fields: Fields,
    doc_count: usize,
}

impl std::fmt::Debug for RecordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIndex")
            .field("doc_count", &self.doc_count)
            .finish_non_exhaustive()
    }
}

impl RecordIndex {
    pub fn build(records: &[Record]) -> Result<Self, SearchError> {
        let schema = build_schema();
        let fields = fields_from_schema(&schema)?;
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        for record in records {
            writer.add_document(doc!(
                fields.id => record.id.clone(),
                fields.title => record.title().to_string(),
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        debug!(docs = records.len(), "record_index_built");

        Ok(Self {
            index,
            reader,
            fields,
            doc_count: records.len(),
        })
    }

    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }
}

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("title", TEXT);
    schema_builder.build()
}

pub fn fields_from_schema(schema: &Schema) -> Result<Fields, SearchError> {
    Ok(Fields {
        id: schema
            .get_field("id")
            .map_err(|_| SearchError::MissingField("id"))?,
        title: schema
            .get_field("title")
            .map_err(|_| SearchError::MissingField("title"))?,
    })
}
