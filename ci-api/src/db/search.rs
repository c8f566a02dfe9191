//! Classifier search
//!
//! A search map mixes two kinds of keys. Structural keys (`RU_REF`,
//! `COLLECTION_EXERCISE`, `SURVEY_ID`, `TYPE`) filter on columns of joined
//! entities and are matched exactly as written. Every other key is a semantic
//! classifier: it is lowercased and must be contained, with an equal string
//! value, in the instrument's classifier map.

use ci_common::db::{Instrument, InstrumentType};
use ci_common::{classifiers::scalar_to_string, uuid_utils};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use super::catalog::{instrument_from_row, INSTRUMENT_COLUMNS};
use crate::error::{ApiError, ApiResult};

/// Column-backed search keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralFilter {
    RuRef(String),
    CollectionExercise(String),
    SurveyId(String),
    Type(InstrumentType),
}

/// Parsed search map
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub structural: Vec<StructuralFilter>,
    /// Lowercased key and stringified value pairs
    pub semantic: Vec<(String, String)>,
}

impl SearchFilter {
    /// Parse the `searchString` query parameter
    ///
    /// An absent or empty string matches every instrument.
    pub fn parse(search_string: Option<&str>) -> ApiResult<Self> {
        let raw = match search_string.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(raw) => raw,
        };

        let value: Value = serde_json::from_str(raw)
            .map_err(|_| ApiError::Validation(format!("Invalid search string: {}", raw)))?;
        let object = value
            .as_object()
            .ok_or_else(|| ApiError::Validation("Search string must be a JSON object".to_string()))?;

        let mut filter = Self::default();
        for (key, value) in object {
            let text = scalar_to_string(key, value)?;
            match key.as_str() {
                "RU_REF" => filter.structural.push(StructuralFilter::RuRef(text)),
                "COLLECTION_EXERCISE" => filter
                    .structural
                    .push(StructuralFilter::CollectionExercise(uuid_key(&text)?)),
                "SURVEY_ID" => filter.structural.push(StructuralFilter::SurveyId(uuid_key(&text)?)),
                "TYPE" => {
                    let kind = text
                        .parse::<InstrumentType>()
                        .map_err(|_| ApiError::Validation(format!("Invalid instrument type {}", text)))?;
                    filter.structural.push(StructuralFilter::Type(kind));
                }
                _ => filter.semantic.push((key.to_lowercase(), text)),
            }
        }
        Ok(filter)
    }
}

fn uuid_key(value: &str) -> ApiResult<String> {
    Ok(uuid_utils::to_db(&uuid_utils::parse(value)?))
}

/// Joins the structural keys require; each is added at most once
#[derive(Debug, Default)]
struct JoinPlan {
    business: bool,
    exercise: bool,
}

impl JoinPlan {
    fn for_filter(filter: &SearchFilter) -> Self {
        let mut plan = Self::default();
        for key in &filter.structural {
            match key {
                StructuralFilter::RuRef(_) => plan.business = true,
                StructuralFilter::CollectionExercise(_) => plan.exercise = true,
                // The survey is always joined to render the instrument
                StructuralFilter::SurveyId(_) | StructuralFilter::Type(_) => {}
            }
        }
        plan
    }

    fn push_joins(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" FROM instrument i JOIN survey s ON s.id = i.survey_id");
        if self.business {
            qb.push(
                " JOIN instrument_business ib ON ib.instrument_id = i.id JOIN business b ON b.id = ib.business_id",
            );
        }
        if self.exercise {
            qb.push(
                " JOIN instrument_exercise ie ON ie.instrument_id = i.id JOIN exercise e ON e.id = ie.exercise_id",
            );
        }
    }
}

fn push_predicates<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a SearchFilter) {
    qb.push(" WHERE 1 = 1");
    for key in &filter.structural {
        match key {
            StructuralFilter::RuRef(ru_ref) => {
                qb.push(" AND b.ru_ref = ").push_bind(ru_ref.as_str());
            }
            StructuralFilter::CollectionExercise(id) => {
                qb.push(" AND e.exercise_id = ").push_bind(id.as_str());
            }
            StructuralFilter::SurveyId(id) => {
                qb.push(" AND s.survey_id = ").push_bind(id.as_str());
            }
            StructuralFilter::Type(kind) => {
                qb.push(" AND i.type = ").push_bind(kind.as_str());
            }
        }
    }
    for (key, value) in &filter.semantic {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(i.classifiers) je WHERE je.key = ")
            .push_bind(key.as_str())
            .push(" AND je.value = ")
            .push_bind(value.as_str())
            .push(")");
    }
}

/// Instruments matching the filter, newest first
///
/// A positive `limit` caps the result; anything else returns every match.
pub async fn search(
    conn: &mut SqliteConnection,
    filter: &SearchFilter,
    limit: Option<i64>,
) -> ApiResult<Vec<Instrument>> {
    let plan = JoinPlan::for_filter(filter);
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {}", INSTRUMENT_COLUMNS));
    plan.push_joins(&mut qb);
    push_predicates(&mut qb, filter);
    qb.push(" ORDER BY i.created_at DESC, i.id DESC");
    if let Some(limit) = limit.filter(|l| *l > 0) {
        qb.push(" LIMIT ").push_bind(limit);
    }

    debug!(sql = qb.sql(), "Running instrument search");
    let rows = qb.build().fetch_all(conn).await?;
    rows.iter().map(instrument_from_row).collect()
}

/// Number of instruments matching the filter
pub async fn count(conn: &mut SqliteConnection, filter: &SearchFilter) -> ApiResult<i64> {
    let plan = JoinPlan::for_filter(filter);
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    plan.push_joins(&mut qb);
    push_predicates(&mut qb, filter);

    let count: i64 = qb.build_query_scalar::<i64>().fetch_one(conn).await?;
    Ok(count)
}
