use chrono::{DateTime, Utc};
use common::storage::types::stage_status::SummaryCategory;
use surrealdb::{engine::any::Any, method::Query, sql::Datetime as SurrealDatetime};

/// Predicates shared by every search mode. All of them are plain article columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub region: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Matches articles carrying any of these tags.
    pub tags: Vec<String>,
    pub sentiment: Option<String>,
    /// Topic assigned by the summarizer, distinct from the feed's `category`.
    pub summary_category: Option<SummaryCategory>,
    pub language: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl SearchFilters {
    fn tag_values(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// SurrealQL predicates, each referencing a parameter bound by [`SearchFilters::bind`].
    pub fn predicates(&self) -> Vec<&'static str> {
        let mut predicates = Vec::new();
        if non_blank(self.region.as_ref()).is_some() {
            predicates.push("region_id = $filter_region");
        }
        if non_blank(self.category.as_ref()).is_some() {
            predicates.push("category_id = $filter_category");
        }
        if non_blank(self.source.as_ref()).is_some() {
            predicates.push("source_name = $filter_source");
        }
        if self.date_from.is_some() {
            predicates.push("published_at >= $filter_date_from");
        }
        if self.date_to.is_some() {
            predicates.push("published_at <= $filter_date_to");
        }
        if !self.tag_values().is_empty() {
            predicates.push("summary_tags CONTAINSANY $filter_tags");
        }
        if non_blank(self.sentiment.as_ref()).is_some() {
            predicates.push("summary_sentiment = $filter_sentiment");
        }
        if self.summary_category.is_some() {
            predicates.push("summary_category = $filter_summary_category");
        }
        if non_blank(self.language.as_ref()).is_some() {
            predicates.push("source_language = $filter_language");
        }
        predicates
    }

    pub fn bind<'a>(&self, mut query: Query<'a, Any>) -> Query<'a, Any> {
        if let Some(region) = non_blank(self.region.as_ref()) {
            query = query.bind(("filter_region", region.to_string()));
        }
        if let Some(category) = non_blank(self.category.as_ref()) {
            query = query.bind(("filter_category", category.to_string()));
        }
        if let Some(source) = non_blank(self.source.as_ref()) {
            query = query.bind(("filter_source", source.to_string()));
        }
        if let Some(from) = self.date_from {
            query = query.bind(("filter_date_from", SurrealDatetime::from(from)));
        }
        if let Some(to) = self.date_to {
            query = query.bind(("filter_date_to", SurrealDatetime::from(to)));
        }
        let tags = self.tag_values();
        if !tags.is_empty() {
            query = query.bind(("filter_tags", tags));
        }
        if let Some(sentiment) = non_blank(self.sentiment.as_ref()) {
            query = query.bind(("filter_sentiment", sentiment.to_string()));
        }
        if let Some(category) = self.summary_category {
            query = query.bind(("filter_summary_category", category.as_str()));
        }
        if let Some(language) = non_blank(self.language.as_ref()) {
            query = query.bind(("filter_language", language.to_string()));
        }
        query
    }

    /// `WHERE` body combining `base` predicates with the active filters.
    pub fn where_clause(&self, base: &[&str]) -> String {
        let mut predicates: Vec<&str> = base.to_vec();
        predicates.extend(self.predicates());
        if predicates.is_empty() {
            "true".to_string()
        } else {
            predicates.join(" AND ")
        }
    }
}
