use anyhow::{Context, Result};
use listing::{ListQuery, PageRequest, PagedResult};
use sqlx::{sqlite::SqliteRow, Pool, QueryBuilder, Sqlite};

/// How one entity table is searched, sorted and scoped.
///
/// Logical field names map to SQL expressions so callers never splice
/// user input into the statement; only `push_bind` carries values.
pub(crate) struct TableSpec {
    pub select: &'static str,
    pub from: &'static str,
    pub id_column: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
    pub searchable: &'static [&'static str],
    pub scope_column: Option<&'static str>,
}

impl TableSpec {
    fn column(&self, field: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
    }

    /// SQL columns behind the entity's searchable fields; fields without a
    /// column are skipped.
    pub fn search_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.searchable.iter().filter_map(|field| self.column(field))
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
        let mut has_where = false;
        if let (Some(column), Some(scope)) = (self.scope_column, query.scope) {
            qb.push(" WHERE ").push(column).push(" = ").push_bind(scope);
            has_where = true;
        }

        let Some(pattern) = query.search.as_deref().map(search_pattern) else {
            return;
        };
        qb.push(if has_where { " AND (" } else { " WHERE (" });
        let mut first = true;
        for column in self.search_columns() {
            if !first {
                qb.push(" OR ");
            }
            first = false;
            qb.push("COALESCE(")
                .push(column)
                .push(", '') REGEXP ")
                .push_bind(pattern.clone());
        }
        if first {
            qb.push("0");
        }
        qb.push(")");
    }

    fn push_order(&self, qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
        let direction = query.sort_direction.as_sql();
        let column = self.column(&query.sort_field).unwrap_or(self.id_column);
        qb.push(" ORDER BY ").push(column).push(" ").push(direction);
        if column != self.id_column {
            qb.push(", ").push(self.id_column).push(" ").push(direction);
        }
    }

    pub async fn count(&self, pool: &Pool<Sqlite>, query: &ListQuery) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        qb.push(self.from);
        self.push_where(&mut qb, query);
        let total = qb
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await
            .context("count query failed")?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    pub async fn page<T>(
        &self,
        pool: &Pool<Sqlite>,
        query: &ListQuery,
        page: PageRequest,
        decode: fn(&SqliteRow) -> T,
    ) -> Result<PagedResult<T>> {
        let total = self.count(pool, query).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(self.select).push(" FROM ").push(self.from);
        self.push_where(&mut qb, query);
        self.push_order(&mut qb, query);
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(pool).await.context("page query failed")?;
        Ok(PagedResult {
            items: rows.iter().map(decode).collect(),
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    pub async fn all<T>(
        &self,
        pool: &Pool<Sqlite>,
        query: &ListQuery,
        decode: fn(&SqliteRow) -> T,
    ) -> Result<Vec<T>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(self.select).push(" FROM ").push(self.from);
        self.push_where(&mut qb, query);
        self.push_order(&mut qb, query);

        let rows = qb.build().fetch_all(pool).await.context("list query failed")?;
        Ok(rows.iter().map(decode).collect())
    }
}

/// Case-insensitive substring pattern for the `REGEXP` function registered
/// by `with_regexp`. `(?i)` folds Unicode case, so `café` finds `CAFÉ`.
pub(crate) fn search_pattern(raw: &str) -> String {
    format!("(?i){}", regex::escape(raw))
}

/// Deletes every row in `ids` inside one transaction, or none of them when
/// any id does not resolve. Returns the unresolved ids in that case.
pub(crate) async fn delete_all_or_nothing(
    pool: &Pool<Sqlite>,
    table: &'static str,
    ids: &[i64],
) -> Result<listing::DeleteOutcome<i64>> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(listing::DeleteOutcome::Deleted(0));
    }

    let mut tx = pool.begin().await?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM ");
    qb.push(table).push(" WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in &ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let existing = qb.build_query_scalar::<i64>().fetch_all(&mut *tx).await?;

    let missing: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| !existing.contains(id))
        .collect();
    if !missing.is_empty() {
        tx.rollback().await?;
        return Ok(listing::DeleteOutcome::Missing(missing));
    }

    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
    qb.push(table).push(" WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in &ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let deleted = qb
        .build()
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to delete from {table}"))?
        .rows_affected();

    tx.commit().await?;
    Ok(listing::DeleteOutcome::Deleted(deleted))
}
