use sqlx::types::Json;
use time::OffsetDateTime;

use crate::application::repos::RepoError;
use crate::domain::entities::{GroupRecord, ListEntry, SourceRecord};

use super::util::{convert_count, convert_id};

#[derive(sqlx::FromRow)]
pub(crate) struct ListEntryRow {
    pub(crate) id: i64,
    pub(crate) time: OffsetDateTime,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) source_name: String,
    pub(crate) is_rt: bool,
    pub(crate) enclosure: Option<String>,
}

impl TryFrom<ListEntryRow> for ListEntry {
    type Error = RepoError;

    fn try_from(row: ListEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: convert_id(row.id)?,
            time: row.time,
            title: row.title,
            description: row.description.filter(|d| !d.is_empty()),
            enclosure: row.enclosure.filter(|e| !e.is_empty()),
            is_realtime: row.is_rt,
            source_name: row.source_name,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct GroupDetailRow {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) full_text: Option<String>,
    pub(crate) time: OffsetDateTime,
    pub(crate) is_rt: bool,
    pub(crate) views_count: i64,
    pub(crate) enclosure: Option<String>,
    pub(crate) sources: Json<Vec<SourceRecord>>,
}

impl TryFrom<GroupDetailRow> for GroupRecord {
    type Error = RepoError;

    fn try_from(row: GroupDetailRow) -> Result<Self, Self::Error> {
        let mut record = Self {
            id: convert_id(row.id)?,
            title: row.title,
            description: row.description,
            time: row.time,
            full_text: row.full_text,
            enclosure: row.enclosure.filter(|e| !e.is_empty()),
            is_realtime: row.is_rt,
            views_count: convert_count(row.views_count)?,
            sources: row.sources.0,
        };
        record.order_sources();
        Ok(record)
    }
}
