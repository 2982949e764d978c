use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};

/// What the SQL agent needs from a database.
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    fn dialect(&self) -> &'static str;

    async fn table_names(&self) -> Result<Vec<String>>;

    /// Column definitions plus a few sample rows for each table.
    async fn table_info(&self, tables: &[String]) -> Result<String>;

    /// Runs a read-only query; each row comes back as a JSON object string.
    async fn run(&self, query: &str) -> Result<Vec<String>>;
}

pub struct PgDatabase {
    pool: PgPool,
    sample_rows: usize,
}

impl PgDatabase {
    /// The pool connects on first use, so startup does not wait on the
    /// database.
    pub fn connect_lazy(config: &DatabaseConfig, sample_rows: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&config.connection_url())?;
        Ok(Self { pool, sample_rows })
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String, bool)>> {
        let rows = sqlx::query(
            "SELECT column_name::text AS column_name, data_type::text AS data_type, is_nullable = 'YES' AS nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("column_name")?,
                    row.try_get::<String, _>("data_type")?,
                    row.try_get::<bool, _>("nullable")?,
                ))
            })
            .collect()
    }

    async fn json_rows(&self, sql: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, Option<String>>(sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Option::unwrap_or_default).collect())
    }
}

#[async_trait]
impl SqlDatabase for PgDatabase {
    fn dialect(&self) -> &'static str {
        "postgresql"
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type IN ('BASE TABLE', 'VIEW') \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn table_info(&self, tables: &[String]) -> Result<String> {
        let known = self.table_names().await?;
        let mut sections = Vec::with_capacity(tables.len());

        for table in tables {
            if !known.contains(table) {
                return Err(AppError::DatabaseError(format!(
                    "table_names {{'{}'}} not found in database",
                    table
                )));
            }

            let columns = self.columns(table).await?;
            let defs: Vec<String> = columns
                .iter()
                .map(|(name, ty, nullable)| {
                    let null = if *nullable { "" } else { " NOT NULL" };
                    format!("\t{} {}{}", quote_ident(name), ty.to_uppercase(), null)
                })
                .collect();

            let sample_sql = format!(
                "SELECT row_to_json(t)::text FROM {} t LIMIT {}",
                quote_ident(table),
                self.sample_rows
            );
            let samples = self.json_rows(&sample_sql).await?;

            sections.push(format!(
                "CREATE TABLE {} (\n{}\n)\n\n/*\n{} rows from {} table:\n{}\n*/",
                quote_ident(table),
                defs.join(",\n"),
                self.sample_rows,
                table,
                samples.join("\n")
            ));
        }

        Ok(sections.join("\n\n"))
    }

    async fn run(&self, query: &str) -> Result<Vec<String>> {
        let wrapped = wrap_read_only(query)?;
        self.json_rows(&wrapped).await
    }
}

/// Wraps a statement so it can only be read from. Data-modifying statements
/// are rejected by PostgreSQL inside a subquery.
pub fn wrap_read_only(query: &str) -> Result<String> {
    let trimmed = query.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(AppError::DatabaseError("empty query".to_string()));
    }
    if trimmed.contains(';') {
        return Err(AppError::DatabaseError("only a single statement is allowed".to_string()));
    }
    Ok(format!("SELECT row_to_json(q)::text FROM ({}) q", trimmed))
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_are_wrapped_as_subqueries() {
        assert_eq!(
            wrap_read_only("SELECT * FROM heatwaves LIMIT 5;").unwrap(),
            "SELECT row_to_json(q)::text FROM (SELECT * FROM heatwaves LIMIT 5) q"
        );
    }

    #[test]
    fn stacked_or_empty_statements_are_refused() {
        assert!(wrap_read_only("SELECT 1; DROP TABLE heatwaves").is_err());
        assert!(wrap_read_only("  ;  ").is_err());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("cold\"snaps"), "\"cold\"\"snaps\"");
    }
}
