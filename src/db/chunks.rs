use super::{Db, models::*, serialize_vector};
use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Result, Row, params};

pub(crate) const CHUNK_COLUMNS: &str = "c.id, c.chunk_id, c.content, c.source, c.project, c.repo, c.section, c.file, c.version, c.functions";

/// Keeps `IN (...)` lists under SQLite's historical host-parameter limit.
const MAX_IDS_PER_QUERY: usize = 900;

fn decode_list(raw: &str, idx: usize) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn encode_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub(crate) fn map_chunk(row: &Row<'_>) -> Result<StoredChunk> {
    let source: String = row.get(3)?;
    let section: String = row.get(6)?;
    let file: String = row.get(7)?;
    let functions: Option<String> = row.get(9)?;

    Ok(StoredChunk {
        seq: row.get(0)?,
        chunk_id: row.get(1)?,
        content: row.get(2)?,
        source: ChunkSource::from_db(&source),
        project: row.get(4)?,
        repo: row.get(5)?,
        section: decode_list(&section, 6)?,
        file: decode_list(&file, 7)?,
        version: row.get(8)?,
        functions: functions.map(|raw| decode_list(&raw, 9)).transpose()?,
    })
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

impl Db {
    fn query_chunks(&self, query: &str, params: &[Value]) -> Result<Vec<StoredChunk>> {
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_chunk)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Inserts chunks with their embeddings. Chunks whose `chunk_id` already
    /// exists are left untouched and counted as skipped.
    pub fn insert_chunks(
        &mut self,
        chunks: &[NewChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<InsertOutcome> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;
        let mut outcome = InsertOutcome::default();
        let now = Utc::now();

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let inserted = tx.execute(
                r#"
                INSERT INTO chunks (chunk_id, content, source, project, repo, section, file, version, ingested_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO NOTHING
                "#,
                params![
                    chunk.chunk_id,
                    chunk.content,
                    chunk.source.as_str(),
                    chunk.project,
                    chunk.repo,
                    encode_list(&chunk.section)?,
                    encode_list(&chunk.file)?,
                    chunk.version,
                    now,
                ],
            )?;

            if inserted == 0 {
                outcome.skipped += 1;
                continue;
            }

            let rowid = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![rowid, serialize_vector(embedding)],
            )?;
            outcome.added += 1;
        }

        tx.commit()?;
        Ok(outcome)
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<StoredChunk>> {
        self.conn
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.chunk_id = ?"),
                params![chunk_id],
                map_chunk,
            )
            .optional()
    }

    /// All chunks inside a scope, in insertion order.
    pub fn find_in_scope(&self, scope: &ScopeFilter<'_>) -> Result<Vec<StoredChunk>> {
        let mut query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.source = ? AND c.project IS ? AND c.repo IS ?"
        );
        let mut params = vec![
            Value::Text(scope.source.as_str().to_string()),
            opt_text(scope.project),
            opt_text(scope.repo),
        ];

        if !scope.section.is_empty() {
            query.push_str(" AND c.section = ?");
            params.push(Value::Text(encode_list(scope.section)?));
        }
        if !scope.file.is_empty() {
            query.push_str(" AND c.file = ?");
            params.push(Value::Text(encode_list(scope.file)?));
        }
        query.push_str(" ORDER BY c.id");

        self.query_chunks(&query, &params)
    }

    /// Bulk lookup by `chunk_id`. Unknown ids are simply absent from the result.
    pub fn find_by_ids(&self, ids: &[String]) -> Result<Vec<StoredChunk>> {
        let mut results = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let query = format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.chunk_id IN ({placeholders}) ORDER BY c.id"
            );
            let params: Vec<Value> = batch.iter().map(|id| Value::Text(id.clone())).collect();
            results.extend(self.query_chunks(&query, &params)?);
        }
        Ok(results)
    }

    /// Number of code chunks the resolver would visit, and the highest row id
    /// among them.
    pub fn count_resolution_candidates(&self, force: bool) -> Result<(usize, i64)> {
        let query = if force {
            "SELECT COUNT(*), COALESCE(MAX(id), 0) FROM chunks WHERE source = 'code'"
        } else {
            "SELECT COUNT(*), COALESCE(MAX(id), 0) FROM chunks WHERE source = 'code' AND functions IS NULL"
        };
        self.conn.query_row(query, [], |row| {
            Ok((row.get::<_, i64>(0)? as usize, row.get(1)?))
        })
    }

    /// Next page of resolver candidates after row id `after`, never past
    /// `upper_bound`.
    pub fn find_resolution_page(
        &self,
        after: i64,
        upper_bound: i64,
        limit: usize,
        force: bool,
    ) -> Result<Vec<StoredChunk>> {
        let mut query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.source = 'code' AND c.id > ? AND c.id <= ?"
        );
        if !force {
            query.push_str(" AND c.functions IS NULL");
        }
        query.push_str(" ORDER BY c.id LIMIT ?");

        self.query_chunks(
            &query,
            &[
                Value::Integer(after),
                Value::Integer(upper_bound),
                Value::Integer(limit as i64),
            ],
        )
    }

    /// Stores a chunk's dependency list. Returns the number of rows whose
    /// value actually changed.
    pub fn update_functions(&self, chunk_id: &str, functions: &[String]) -> Result<usize> {
        self.conn.execute(
            "UPDATE chunks SET functions = ?2 WHERE chunk_id = ?1 AND (functions IS NULL OR functions <> ?2)",
            params![chunk_id, encode_list(functions)?],
        )
    }

    /// Removes every chunk (and vector) of a project/repo pair.
    pub fn delete_repo_chunks(&self, project: Option<&str>, repo: Option<&str>) -> Result<usize> {
        // vec0 tables don't take part in cascades
        self.conn.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE project IS ? AND repo IS ?)",
            params![project, repo],
        )?;
        self.conn.execute(
            "DELETE FROM chunks WHERE project IS ? AND repo IS ?",
            params![project, repo],
        )
    }
}
