use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, RegexQuery};
use tantivy::schema::{Term, Value};
use tantivy::TantivyDocument;
use tracing::{debug, warn};

use crate::model::Record;
use crate::search::tantivy::{Fields, SearchError};
use crate::store::Collection;

/// Maximum edit distance for the fuzzy clause.
pub const FUZZY_DISTANCE: u8 = 2;
pub const FUZZY_BOOST: f32 = 1.0;
/// Prefix hits outrank fuzzy hits so typing the start of a title wins.
pub const PREFIX_BOOST: f32 = 4.0;

#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    pub fuzzy_distance: u8,
    pub fuzzy_boost: f32,
    pub prefix_boost: f32,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self {
            fuzzy_distance: FUZZY_DISTANCE,
            fuzzy_boost: FUZZY_BOOST,
            prefix_boost: PREFIX_BOOST,
        }
    }
}

impl SearchEngine {
    /// Records matching `text`, most relevant first.
    ///
    /// Blank text returns the whole collection in id order without touching
    /// the index.
    pub fn query(&self, collection: &Collection, text: &str) -> Result<Vec<Record>, SearchError> {
        if text.trim().is_empty() {
            return Ok(collection.records().to_vec());
        }
        let index = collection.index();
        let Some(query) = self.build_query(&index.fields, text)? else {
            return Ok(Vec::new());
        };
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = index.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(index.len()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (_score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let Some(id) = doc.get_first(index.fields.id).and_then(|v| v.as_str()) else {
                continue;
            };
            match collection.find(id) {
                Some(record) => hits.push(record.clone()),
                None => warn!(id, "index hit without a matching record"),
            }
        }
        debug!(terms = text, hits = hits.len(), "search_done");
        Ok(hits)
    }

    /// One fuzzy and one prefix clause per term, all optional.
    fn build_query(
        &self,
        fields: &Fields,
        text: &str,
    ) -> Result<Option<Box<dyn Query>>, SearchError> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for term_text in terms(text) {
            let term = Term::from_field_text(fields.title, &term_text);

            let fuzzy = FuzzyTermQuery::new(term, self.fuzzy_distance, true);
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(fuzzy), self.fuzzy_boost)),
            ));

            let pattern = format!("{}.*", regex::escape(&term_text));
            let prefix = RegexQuery::from_pattern(&pattern, fields.title)?;
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(prefix), self.prefix_boost)),
            ));
        }
        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }
}

/// Split the way the title field's default tokenizer does: alphanumeric runs,
/// lower-cased.
fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(titles: &[(&str, &str)]) -> Collection {
        Collection::from_records(
            titles
                .iter()
                .map(|(id, title)| Record::new(*id, *title))
                .collect(),
        )
        .unwrap()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn blank_query_returns_everything_in_id_order() {
        let c = collection(&[("c", "Zeta"), ("a", "Alpha"), ("b", "Beta")]);
        let engine = SearchEngine::default();
        assert_eq!(ids(&engine.query(&c, "").unwrap()), ["a", "b", "c"]);
        assert_eq!(ids(&engine.query(&c, "   ").unwrap()), ["a", "b", "c"]);
    }

    #[test]
    fn prefix_matches_while_typing() {
        let c = collection(&[("1", "GitHub"), ("2", "Gmail"), ("3", "Netflix")]);
        let hits = SearchEngine::default().query(&c, "git").unwrap();
        assert_eq!(hits.first().map(|r| r.id.as_str()), Some("1"));
        assert!(!ids(&hits).contains(&"3"));
    }

    #[test]
    fn fuzzy_tolerates_typos() {
        let c = collection(&[("1", "Netflix"), ("2", "Amazon")]);
        let hits = SearchEngine::default().query(&c, "netflx").unwrap();
        assert_eq!(ids(&hits), ["1"]);
    }

    #[test]
    fn exact_title_outranks_fuzzy_neighbour() {
        // "bank" is one edit from "bang" but only "bank" is a prefix match.
        let c = collection(&[("1", "bang"), ("2", "bank")]);
        let hits = SearchEngine::default().query(&c, "bank").unwrap();
        assert_eq!(ids(&hits), ["2", "1"]);
    }

    #[test]
    fn no_match_is_empty() {
        let c = collection(&[("1", "GitHub")]);
        assert!(SearchEngine::default().query(&c, "zzzzzzzz").unwrap().is_empty());
        assert!(SearchEngine::default().query(&c, "!!!").unwrap().is_empty());
    }

    #[test]
    fn multi_word_query_prefers_records_matching_more_terms() {
        let c = collection(&[("1", "Work Email"), ("2", "Home Email"), ("3", "Work VPN")]);
        let hits = SearchEngine::default().query(&c, "work email").unwrap();
        assert_eq!(hits.first().map(|r| r.id.as_str()), Some("1"));
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn terms_follow_default_tokenizer() {
        assert_eq!(terms("My-Bank  Login!"), ["my", "bank", "login"]);
        assert!(terms("  ").is_empty());
    }
}
