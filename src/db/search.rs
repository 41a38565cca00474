use super::chunks::{CHUNK_COLUMNS, map_chunk};
use super::models::{ChunkSource, StoredChunk};
use super::{Db, serialize_vector};
use rusqlite::Result;
use rusqlite::types::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct SearchFilter<'a> {
    pub source: Option<ChunkSource>,
    pub project: Option<&'a str>,
    pub repo: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: StoredChunk,
    pub similarity: f64,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let distance: f64 = row.get(10)?;
    Ok(SearchResult {
        chunk: map_chunk(row)?,
        similarity: 1.0 - (distance / 2.0),
    })
}

impl Db {
    /// Perform vector similarity search using cosine distance
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter<'_>>,
    ) -> Result<Vec<SearchResult>> {
        let mut query = format!(
            r#"
            SELECT {CHUNK_COLUMNS}, vec_distance_cosine(v.embedding, ?) as distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            "#
        );

        let mut where_clauses = Vec::new();
        let mut params: Vec<Value> = vec![Value::Blob(serialize_vector(query_vector))];

        if let Some(f) = filter {
            if let Some(source) = f.source {
                where_clauses.push("c.source = ?");
                params.push(Value::Text(source.as_str().to_string()));
            }
            if let Some(project) = f.project {
                where_clauses.push("c.project = ?");
                params.push(Value::Text(project.to_string()));
            }
            if let Some(repo) = f.repo {
                where_clauses.push("c.repo = ?");
                params.push(Value::Text(repo.to_string()));
            }
        }

        if !where_clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&where_clauses.join(" AND "));
        }

        query.push_str(" ORDER BY distance ASC LIMIT ?");
        params.push(Value::Integer(top_k as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_search_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
