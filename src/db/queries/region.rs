//! Postgres-backed region directory
//!
//! Runs the exact → prefix → substring cascade as three ordered queries
//! against the pre-populated reference tables. Names in the reference
//! tables are stored uppercase, so the incoming search string (already
//! normalized by the resolver) compares directly.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::services::area_resolver::RegionDirectory;
use crate::types::{RegionLevel, RegionRef};

/// Minimum search length for the substring query, mirroring the
/// resolver's in-memory cascade.
const SUBSTRING_MIN_LEN: usize = 4;

fn table(level: RegionLevel) -> &'static str {
    match level {
        RegionLevel::Province => "provinces",
        RegionLevel::City => "cities",
        RegionLevel::District => "districts",
        RegionLevel::Village => "villages",
    }
}

/// Column holding the parent region code, absent for provinces.
fn parent_column(level: RegionLevel) -> Option<&'static str> {
    match level {
        RegionLevel::Province => None,
        RegionLevel::City => Some("province_code"),
        RegionLevel::District => Some("city_code"),
        RegionLevel::Village => Some("district_code"),
    }
}

pub struct PgRegionDirectory {
    pool: PgPool,
}

impl PgRegionDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lookup(
        &self,
        level: RegionLevel,
        predicate: &str,
        pattern: &str,
        parent_code: Option<&str>,
    ) -> Result<Option<RegionRef>> {
        let table = table(level);
        let parent = parent_column(level).and_then(|column| parent_code.map(|code| (column, code)));

        let mut sql = format!("SELECT code, name FROM {table} WHERE {predicate}");
        if let Some((column, _)) = parent {
            sql.push_str(&format!(" AND {column} = $2"));
        }
        sql.push_str(" ORDER BY code LIMIT 1");

        let mut query = sqlx::query_as::<_, (String, String)>(&sql).bind(pattern);
        if let Some((_, code)) = parent {
            query = query.bind(code);
        }

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|(code, name)| RegionRef { code, name }))
    }
}

#[async_trait]
impl RegionDirectory for PgRegionDirectory {
    async fn resolve(
        &self,
        level: RegionLevel,
        search: &str,
        parent_code: Option<&str>,
    ) -> Result<Option<RegionRef>> {
        if let Some(hit) = self
            .lookup(level, "UPPER(name) = $1", search, parent_code)
            .await?
        {
            return Ok(Some(hit));
        }

        if let Some(hit) = self
            .lookup(
                level,
                "UPPER(name) LIKE $1 || '%'",
                search,
                parent_code,
            )
            .await?
        {
            return Ok(Some(hit));
        }

        if search.len() >= SUBSTRING_MIN_LEN {
            if let Some(hit) = self
                .lookup(
                    level,
                    "UPPER(name) LIKE '%' || $1 || '%'",
                    search,
                    parent_code,
                )
                .await?
            {
                return Ok(Some(hit));
            }
        }

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
