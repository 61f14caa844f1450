use crate::engines::generation::schema::GeneSchema;
use crate::error::{Result, SimtuneError};
use crate::types::{EvaluationContext, GeneVector};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Persistent (context, genes) -> fitness store backed by SQLite.
///
/// One column per schema slot, named after the slot, so the table doubles
/// as a readable audit log of every configuration ever scored. The primary
/// key spans the context and all slot columns: a later write for the same
/// key overwrites instead of duplicating. All access goes through an
/// internal mutex, so workers may call `record` concurrently; the backing
/// store never sees interleaved raw writes.
#[derive(Debug)]
pub struct FitnessCache {
    conn: Mutex<Connection>,
    slot_names: Vec<&'static str>,
}

const TABLE: &str = "fitness_cache";

impl FitnessCache {
    /// Open (or create) the cache at `path`. Failure here is fatal to the
    /// run: without a place to persist expensive results the driver must
    /// not start.
    pub fn open<P: AsRef<Path>>(path: P, schema: &GeneSchema) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| {
            SimtuneError::CacheUnavailable(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::with_connection(conn, schema)
    }

    /// In-memory cache for tests and demos; same schema, no durability.
    pub fn open_in_memory(schema: &GeneSchema) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SimtuneError::CacheUnavailable(e.to_string()))?;
        Self::with_connection(conn, schema)
    }

    fn with_connection(conn: Connection, schema: &GeneSchema) -> Result<Self> {
        let slot_names = schema.slot_names();
        let columns: Vec<String> = slot_names
            .iter()
            .map(|name| format!("{} INTEGER NOT NULL", name))
            .collect();
        let key: Vec<&str> = slot_names.to_vec();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (context TEXT NOT NULL, {}, fitness REAL NOT NULL, \
             PRIMARY KEY (context, {}))",
            TABLE,
            columns.join(", "),
            key.join(", "),
        );
        conn.execute(&ddl, [])
            .map_err(|e| SimtuneError::CacheUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            slot_names,
        })
    }

    fn key_params(context: &EvaluationContext, genes: &GeneVector) -> Vec<Value> {
        let mut params = Vec::with_capacity(1 + genes.len());
        params.push(Value::Text(context.as_str().to_string()));
        params.extend(genes.iter().map(|&g| Value::Integer(g as i64)));
        params
    }

    /// Exact-match lookup; no fuzzy matching.
    pub fn lookup(&self, context: &EvaluationContext, genes: &GeneVector) -> Result<Option<f64>> {
        let conditions: Vec<String> = self
            .slot_names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} = ?{}", name, i + 2))
            .collect();
        let sql = format!(
            "SELECT fitness FROM {} WHERE context = ?1 AND {}",
            TABLE,
            conditions.join(" AND ")
        );

        let conn = self.conn.lock().expect("cache mutex poisoned");
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(Self::key_params(context, genes)))?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite the entry for (context, genes).
    pub fn record(
        &self,
        context: &EvaluationContext,
        genes: &GeneVector,
        fitness: f64,
    ) -> Result<()> {
        let placeholders: Vec<String> = (0..self.slot_names.len() + 2)
            .map(|i| format!("?{}", i + 1))
            .collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (context, {}, fitness) VALUES ({})",
            TABLE,
            self.slot_names.join(", "),
            placeholders.join(", ")
        );

        let mut params = Self::key_params(context, genes);
        params.push(Value::Real(fitness));

        let conn = self.conn.lock().expect("cache mutex poisoned");
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| SimtuneError::CacheWrite(e.to_string()))?;
        stmt.execute(params_from_iter(params))
            .map_err(|e| SimtuneError::CacheWrite(e.to_string()))?;
        Ok(())
    }

    /// `record` with recovery: one retry, then log and drop.
    /// Losing the memoization for one entry is acceptable; the caller's
    /// in-memory fitness is unaffected either way.
    pub fn record_or_drop(&self, context: &EvaluationContext, genes: &GeneVector, fitness: f64) {
        if self.record(context, genes, fitness).is_ok() {
            return;
        }
        if let Err(e) = self.record(context, genes, fitness) {
            log::warn!(
                "dropping cache entry for {:?} under '{}': {}",
                genes,
                context,
                e
            );
        }
    }

    /// Dump every entry as delimited text: a header row naming each slot
    /// and the fitness column, then one row per entry in insertion order.
    /// Not consulted by the optimization logic; this is the audit surface.
    pub fn export<W: Write>(&self, sink: W) -> Result<usize> {
        let sql = format!(
            "SELECT context, {}, fitness FROM {} ORDER BY rowid",
            self.slot_names.join(", "),
            TABLE
        );

        let mut writer = csv::Writer::from_writer(sink);
        let mut header = vec!["context"];
        header.extend(self.slot_names.iter().copied());
        header.push("fitness");
        writer.write_record(&header)?;

        let conn = self.conn.lock().expect("cache mutex poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let n_cols = self.slot_names.len() + 2;
        let mut rows = stmt.query([])?;
        let mut exported = 0;
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(n_cols);
            record.push(row.get::<_, String>(0)?);
            for i in 1..n_cols - 1 {
                record.push(row.get::<_, i64>(i)?.to_string());
            }
            record.push(row.get::<_, f64>(n_cols - 1)?.to_string());
            writer.write_record(&record)?;
            exported += 1;
        }
        writer.flush()?;
        Ok(exported)
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("cache mutex poisoned");
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(label: &str) -> EvaluationContext {
        EvaluationContext::new(label)
    }

    #[test]
    fn test_record_then_lookup() {
        let schema = GeneSchema::suite_default();
        let cache = FitnessCache::open_in_memory(&schema).unwrap();
        let genes = vec![1, 1, 1, 1, 1, 1, 1];

        assert_eq!(cache.lookup(&ctx("2011-07"), &genes).unwrap(), None);
        cache.record(&ctx("2011-07"), &genes, 3.5).unwrap();
        assert_eq!(cache.lookup(&ctx("2011-07"), &genes).unwrap(), Some(3.5));
    }

    #[test]
    fn test_record_overwrites_not_duplicates() {
        let schema = GeneSchema::suite_default();
        let cache = FitnessCache::open_in_memory(&schema).unwrap();
        let genes = vec![2, 1, 2, 2, 2, 2, 1];

        cache.record(&ctx("w1"), &genes, 1.0).unwrap();
        cache.record(&ctx("w1"), &genes, 2.0).unwrap();

        assert_eq!(cache.lookup(&ctx("w1"), &genes).unwrap(), Some(2.0));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_contexts_are_distinct_keys() {
        let schema = GeneSchema::suite_default();
        let cache = FitnessCache::open_in_memory(&schema).unwrap();
        let genes = vec![1, 1, 1, 1, 1, 1, 1];

        cache.record(&ctx("w1"), &genes, 1.0).unwrap();
        cache.record(&ctx("w2"), &genes, 9.0).unwrap();

        assert_eq!(cache.lookup(&ctx("w1"), &genes).unwrap(), Some(1.0));
        assert_eq!(cache.lookup(&ctx("w2"), &genes).unwrap(), Some(9.0));
        assert_eq!(cache.len().unwrap(), 2);
    }

    #[test]
    fn test_export_headers_and_rows() {
        let schema = GeneSchema::suite_default();
        let cache = FitnessCache::open_in_memory(&schema).unwrap();
        cache
            .record(&ctx("w1"), &vec![1, 1, 1, 1, 1, 1, 1], 0.25)
            .unwrap();
        cache
            .record(&ctx("w1"), &vec![2, 1, 2, 2, 2, 2, 1], 0.5)
            .unwrap();

        let mut out = Vec::new();
        let exported = cache.export(&mut out).unwrap();
        assert_eq!(exported, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("context,microphysics,"));
        assert!(header.ends_with(",fitness"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let schema = GeneSchema::suite_default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fitness_cache.db");
        let genes = vec![1, 1, 1, 1, 1, 1, 1];

        {
            let cache = FitnessCache::open(&path, &schema).unwrap();
            cache.record(&ctx("w1"), &genes, 7.0).unwrap();
        }

        let reopened = FitnessCache::open(&path, &schema).unwrap();
        assert_eq!(reopened.lookup(&ctx("w1"), &genes).unwrap(), Some(7.0));
    }

    #[test]
    fn test_open_unwritable_path_is_fatal() {
        let schema = GeneSchema::suite_default();
        let err = FitnessCache::open("/nonexistent-dir/cache.db", &schema).unwrap_err();
        assert!(matches!(err, SimtuneError::CacheUnavailable(_)));
    }
}
