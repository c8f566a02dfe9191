//! Typed lookups against the upstream services

use serde::Deserialize;
use uuid::Uuid;

use super::{Service, ServiceClient};
use crate::error::{ApiError, ApiResult};

/// Case group of a case, as much of it as survey responses need
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseGroup {
    pub sample_unit_ref: Option<String>,
    pub collection_exercise_id: Option<String>,
    pub party_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Case {
    case_group: Option<CaseGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionExercise {
    pub exercise_ref: Option<String>,
    pub survey_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Survey {
    survey_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessParty {
    pub checkletter: Option<String>,
}

impl ServiceClient {
    /// Case group for a case; missing group is not found
    pub async fn case_group(&self, case_id: &str) -> ApiResult<CaseGroup> {
        let case: Case = self.get_json(Service::Case, "cases", case_id, &[]).await?;
        case.case_group
            .ok_or_else(|| ApiError::NotFound(format!("Case group not found for case {}", case_id)))
    }

    pub async fn collection_exercise(&self, exercise_id: &str) -> ApiResult<CollectionExercise> {
        self.get_json(Service::CollectionExercise, "collectionexercises", exercise_id, &[])
            .await
    }

    /// Survey the exercise belongs to
    pub async fn exercise_survey_id(&self, exercise_id: &Uuid) -> ApiResult<Uuid> {
        let exercise = self.collection_exercise(&exercise_id.to_string()).await?;
        let survey_id = exercise.survey_id.ok_or_else(|| {
            ApiError::NotFound(format!("Survey not found for collection exercise {}", exercise_id))
        })?;
        Uuid::parse_str(&survey_id).map_err(|_| ApiError::Upstream {
            service: Service::CollectionExercise.name().to_string(),
            status: 200,
        })
    }

    pub async fn survey_ref(&self, survey_id: &str) -> ApiResult<String> {
        let survey: Survey = self.get_json(Service::Survey, "surveys", survey_id, &[]).await?;
        survey
            .survey_ref
            .ok_or_else(|| ApiError::NotFound(format!("Survey ref not found for survey {}", survey_id)))
    }

    /// Business party with its per-exercise attributes
    pub async fn business_party(&self, party_id: &str, exercise_id: &str) -> ApiResult<BusinessParty> {
        self.get_json(
            Service::Party,
            "party-api/v1/businesses/id",
            party_id,
            &[("verbose", "true"), ("collection_exercise_id", exercise_id)],
        )
        .await
    }
}
