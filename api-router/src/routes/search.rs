use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{error::AppError, storage::types::stage_status::SummaryCategory};
use retrieval_pipeline::{SearchFilters, SearchMode, SearchPage, SearchRequest, SearchSort};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub mode: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub region: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    pub sentiment: Option<String>,
    /// Summarizer topic, e.g. `economics`.
    pub summary_category: Option<String>,
    pub language: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_number(name: &str, value: Option<&String>) -> Result<usize, AppError> {
    match present(value) {
        None => Ok(0),
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| AppError::Validation(format!("'{name}' must be a positive integer"))),
    }
}

/// Accepts RFC 3339 timestamps or plain dates. A plain `dateTo` covers the whole day.
fn parse_date(name: &str, value: Option<&String>, end_of_day: bool) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(timestamp.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("'{name}' must be a date (YYYY-MM-DD)")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    };
    Ok(time.map(|time| date.and_time(time).and_utc()))
}

impl SearchParams {
    pub fn into_request(self) -> Result<SearchRequest, AppError> {
        let mode = match present(self.mode.as_ref()) {
            Some(raw) => raw.parse::<SearchMode>()?,
            None => SearchMode::default(),
        };
        let sort = match present(self.sort.as_ref()) {
            Some(raw) => raw.parse::<SearchSort>()?,
            None => SearchSort::default(),
        };
        let tags = present(self.tags.as_ref())
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let summary_category = present(self.summary_category.as_ref())
            .map(str::parse::<SummaryCategory>)
            .transpose()?;

        Ok(SearchRequest {
            query: self.q.clone().unwrap_or_default(),
            mode,
            sort,
            page: parse_number("page", self.page.as_ref())?,
            page_size: parse_number("pageSize", self.page_size.as_ref())?,
            filters: SearchFilters {
                region: self.region,
                category: self.category,
                source: self.source,
                date_from: parse_date("dateFrom", self.date_from.as_ref(), false)?,
                date_to: parse_date("dateTo", self.date_to.as_ref(), true)?,
                tags,
                sentiment: self.sentiment,
                summary_category,
                language: self.language,
            },
        })
    }
}

pub async fn search_articles(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchPage>, ApiError> {
    let request = params.into_request()?;
    let page = state.search.search(&request).await?;
    Ok(Json(page))
}
