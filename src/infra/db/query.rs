//! Parameterized statement construction for group queries.
//!
//! Every variable value is bound through a `$n` placeholder. The builder keeps the SQL text
//! and the bind arguments in lock step, and `finish` rejects any statement whose
//! placeholders do not line up exactly with its arguments.

use std::collections::BTreeSet;

use sqlx::{
    Postgres,
    postgres::{PgArguments, PgRow},
    query::{Query, QueryAs, QueryScalar},
};
use thiserror::Error;
use time::OffsetDateTime;

/// Trailing window, in hours, considered by the engagement ranking.
pub const TOP_WINDOW_HOURS: i32 = 27;

const LIST_ENTRY_COLUMNS: &str = "SELECT g.id, g.time, f.title, f.description, f.source_name, g.is_rt, \
     (SELECT fe.enclosure FROM compares ce \
      JOIN feed fe ON fe.id = ce.feed_id \
      WHERE ce.group_id = g.id AND fe.enclosure IS NOT NULL AND fe.enclosure <> '' \
      LIMIT 1) AS enclosure \
     FROM groups g \
     JOIN feed f ON f.id = g.feed_id";

const GROUP_DETAIL_SELECT: &str = "SELECT g.id, g.title, g.description, g.full_text, g.time, g.is_rt, g.views_count, \
     (SELECT fe.enclosure FROM compares ce \
      JOIN feed fe ON fe.id = ce.feed_id \
      WHERE ce.group_id = g.id AND fe.enclosure IS NOT NULL AND fe.enclosure <> '' \
      LIMIT 1) AS enclosure, \
     COALESCE( \
        json_agg( \
            json_build_object( \
                'id', fc.id, \
                'title', fc.title, \
                'link', fc.link, \
                'name', fc.source_name, \
                'pubDate', fc.time, \
                'description', fc.description, \
                'fullText', COALESCE(fc.full_text, ''), \
                'enclosure', NULLIF(fc.enclosure, '') \
            ) ORDER BY fc.time DESC, fc.id ASC \
        ) FILTER (WHERE fc.id IS NOT NULL), \
        '[]'::json) AS sources \
     FROM groups g \
     LEFT JOIN compares cp ON cp.group_id = g.id \
     LEFT JOIN feed fc ON fc.id = cp.feed_id \
     WHERE g.id = ";

const SEARCH_COLUMNS: [&str; 3] = ["f.title", "f.description", "f.full_text"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryBuildError {
    #[error("statement has {placeholders} placeholders but {arguments} bind arguments")]
    ArgumentMismatch {
        placeholders: usize,
        arguments: usize,
    },
    #[error("placeholder ${missing} is never used")]
    PlaceholderGap { missing: usize },
}

/// A single bind argument, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    BigInt(i64),
    Int(i32),
    Bool(bool),
    Text(String),
    Timestamp(OffsetDateTime),
}

/// SQL text plus its ordered bind arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<BindValue>,
}

// The sqlx query types share `bind` by name only, not through a trait.
macro_rules! bind_all {
    ($query:expr, $args:expr) => {{
        let mut query = $query;
        for arg in $args {
            query = match arg {
                BindValue::BigInt(value) => query.bind(*value),
                BindValue::Int(value) => query.bind(*value),
                BindValue::Bool(value) => query.bind(*value),
                BindValue::Text(value) => query.bind(value.clone()),
                BindValue::Timestamp(value) => query.bind(*value),
            };
        }
        query
    }};
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[BindValue] {
        &self.args
    }

    pub fn query(&self) -> Query<'_, Postgres, PgArguments> {
        bind_all!(sqlx::query(&self.sql), &self.args)
    }

    pub fn query_as<O>(&self) -> QueryAs<'_, Postgres, O, PgArguments>
    where
        O: for<'r> sqlx::FromRow<'r, PgRow>,
    {
        bind_all!(sqlx::query_as::<_, O>(&self.sql), &self.args)
    }

    pub fn query_scalar<O>(&self) -> QueryScalar<'_, Postgres, O, PgArguments>
    where
        (O,): for<'r> sqlx::FromRow<'r, PgRow>,
    {
        bind_all!(sqlx::query_scalar::<_, O>(&self.sql), &self.args)
    }
}

/// Append-only statement builder in the style of `sqlx::QueryBuilder`, but with inspectable
/// arguments.
#[derive(Debug, Default)]
pub struct StatementBuilder {
    sql: String,
    args: Vec<BindValue>,
}

impl StatementBuilder {
    pub fn new(init: impl Into<String>) -> Self {
        Self {
            sql: init.into(),
            args: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_bind(&mut self, value: BindValue) -> &mut Self {
        self.args.push(value);
        self.sql.push('$');
        self.sql.push_str(&self.args.len().to_string());
        self
    }

    /// Require the placeholders in the text to be exactly `$1..$n` for `n` arguments.
    pub fn finish(self) -> Result<Statement, QueryBuildError> {
        let indices = placeholder_indices(&self.sql);
        let placeholders = indices.last().copied().unwrap_or(0);
        if placeholders != self.args.len() {
            return Err(QueryBuildError::ArgumentMismatch {
                placeholders,
                arguments: self.args.len(),
            });
        }
        if let Some(missing) = (1..=placeholders).find(|idx| !indices.contains(idx)) {
            return Err(QueryBuildError::PlaceholderGap { missing });
        }
        Ok(Statement {
            sql: self.sql,
            args: self.args,
        })
    }
}

/// Every `$n` placeholder index in `sql`, ignoring quoted literals.
fn placeholder_indices(sql: &str) -> BTreeSet<usize> {
    let bytes = sql.as_bytes();
    let mut indices = BTreeSet::new();
    let mut in_literal = false;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\'' => in_literal = !in_literal,
            b'$' if !in_literal => {
                let start = idx + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    if let Ok(n) = sql[start..end].parse::<usize>() {
                        indices.insert(n);
                    }
                }
                idx = end;
                continue;
            }
            _ => {}
        }
        idx += 1;
    }
    indices
}

/// Store-side ids are `BIGINT`; ids beyond its range cannot exist and match nothing.
fn bind_id(id: u64) -> BindValue {
    BindValue::BigInt(i64::try_from(id).unwrap_or(i64::MAX))
}

fn bind_limit(limit: u32) -> BindValue {
    BindValue::BigInt(i64::from(limit))
}

/// `%term%` with interior spaces widened into wildcard gaps; `None` for blank terms.
pub fn search_pattern(term: &str) -> Option<String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("%{}%", trimmed.replace(' ', "%")))
}

/// Statement constructors for every group query shape.
pub struct GroupQueries;

impl GroupQueries {
    pub fn list(
        before: OffsetDateTime,
        limit: u32,
        search: &[String],
    ) -> Result<Statement, QueryBuildError> {
        let mut qb = StatementBuilder::new(LIST_ENTRY_COLUMNS);
        qb.push(" WHERE g.time < ")
            .push_bind(BindValue::Timestamp(before));

        let patterns: Vec<String> = search.iter().filter_map(|t| search_pattern(t)).collect();
        if !patterns.is_empty() {
            qb.push(" AND (");
            for (term_idx, pattern) in patterns.into_iter().enumerate() {
                if term_idx > 0 {
                    qb.push(" OR ");
                }
                qb.push("(");
                for (col_idx, column) in SEARCH_COLUMNS.iter().enumerate() {
                    if col_idx > 0 {
                        qb.push(" OR ");
                    }
                    qb.push(column)
                        .push(" ILIKE ")
                        .push_bind(BindValue::Text(pattern.clone()));
                }
                qb.push(")");
            }
            qb.push(")");
        }

        qb.push(" ORDER BY g.time DESC LIMIT ")
            .push_bind(bind_limit(limit));
        qb.finish()
    }

    pub fn top_by_engagement(limit: u32) -> Result<Statement, QueryBuildError> {
        let mut qb = StatementBuilder::new(LIST_ENTRY_COLUMNS);
        qb.push(" WHERE g.time >= NOW() - make_interval(hours => ")
            .push_bind(BindValue::Int(TOP_WINDOW_HOURS))
            .push(") ORDER BY (SELECT COUNT(*) FROM compares c WHERE c.group_id = g.id) DESC, g.time DESC LIMIT ")
            .push_bind(bind_limit(limit));
        qb.finish()
    }

    pub fn realtime(limit: u32, realtime: bool) -> Result<Statement, QueryBuildError> {
        let mut qb = StatementBuilder::new(LIST_ENTRY_COLUMNS);
        qb.push(" WHERE g.is_rt = ")
            .push_bind(BindValue::Bool(realtime))
            .push(" ORDER BY g.time DESC LIMIT ")
            .push_bind(bind_limit(limit));
        qb.finish()
    }

    pub fn similar(id: u64, limit: u32) -> Result<Statement, QueryBuildError> {
        let mut qb = StatementBuilder::new(LIST_ENTRY_COLUMNS);
        qb.push(" WHERE g.id <> ")
            .push_bind(bind_id(id))
            .push(" ORDER BY 1 - (g.embedding <=> (SELECT t.embedding FROM groups t WHERE t.id = ")
            .push_bind(bind_id(id))
            .push(")) DESC, g.time DESC LIMIT ")
            .push_bind(bind_limit(limit));
        qb.finish()
    }

    pub fn detail(id: u64) -> Result<Statement, QueryBuildError> {
        let mut qb = StatementBuilder::new(GROUP_DETAIL_SELECT);
        qb.push_bind(bind_id(id)).push(
            " GROUP BY g.id, g.title, g.description, g.full_text, g.time, g.is_rt, g.views_count",
        );
        qb.finish()
    }

    pub fn max_id() -> Result<Statement, QueryBuildError> {
        StatementBuilder::new("SELECT COALESCE(MAX(id), 0) FROM groups").finish()
    }

    pub fn add_views(id: u64, delta: u64) -> Result<Statement, QueryBuildError> {
        let mut qb = StatementBuilder::new("UPDATE groups SET views_count = views_count + ");
        qb.push_bind(BindValue::BigInt(
            i64::try_from(delta).unwrap_or(i64::MAX),
        ))
        .push(" WHERE id = ")
        .push_bind(bind_id(id));
        qb.finish()
    }
}
