use state_machines::state_machine;
use uuid::Uuid;

use crate::{error::AppError, schema, stored_object};

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum SourceType {
    Book,
    Paper,
    CaseStudy,
    Report,
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Book => "book",
            SourceType::Paper => "paper",
            SourceType::CaseStudy => "case_study",
            SourceType::Report => "report",
            SourceType::Other => "other",
        }
    }
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "book" => SourceType::Book,
            "paper" => SourceType::Paper,
            "case_study" | "case-study" | "casestudy" => SourceType::CaseStudy,
            "report" => SourceType::Report,
            _ => SourceType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum SourceCategory {
    Engineering,
    Management,
    Design,
    Research,
    General,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Engineering => "engineering",
            SourceCategory::Management => "management",
            SourceCategory::Design => "design",
            SourceCategory::Research => "research",
            SourceCategory::General => "general",
        }
    }
}

impl From<String> for SourceCategory {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "engineering" => SourceCategory::Engineering,
            "management" => SourceCategory::Management,
            "design" => SourceCategory::Design,
            "research" => SourceCategory::Research,
            _ => SourceCategory::General,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum SourceStatus {
    #[default]
    Pending,
    Processing,
    Complete,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "Pending",
            SourceStatus::Processing => "Processing",
            SourceStatus::Complete => "Complete",
            SourceStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SourceStatus::Complete)
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusTransition {
    BeginProcessing,
    Complete,
    Fail,
}

impl StatusTransition {
    fn as_str(&self) -> &'static str {
        match self {
            StatusTransition::BeginProcessing => "begin_processing",
            StatusTransition::Complete => "complete",
            StatusTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: SourceLifecycleMachine,
        initial: Pending,
        states: [Pending, Processing, Complete, Failed],
        events {
            begin_processing {
                transition: { from: Pending, to: Processing }
                transition: { from: Failed, to: Processing }
            }
            complete {
                transition: { from: Processing, to: Complete }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
        }
    }

    pub(super) fn pending() -> SourceLifecycleMachine<(), Pending> {
        SourceLifecycleMachine::new(())
    }

    pub(super) fn processing() -> SourceLifecycleMachine<(), Processing> {
        pending()
            .begin_processing()
            .expect("begin_processing transition from Pending should exist")
    }

    pub(super) fn failed() -> SourceLifecycleMachine<(), Failed> {
        processing()
            .fail()
            .expect("fail transition from Processing should exist")
    }
}

fn invalid_transition(state: SourceStatus, event: StatusTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid source status transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_status(
    state: SourceStatus,
    event: StatusTransition,
) -> Result<SourceStatus, AppError> {
    use lifecycle::{failed, pending, processing};
    match (state, event) {
        (SourceStatus::Pending, StatusTransition::BeginProcessing) => pending()
            .begin_processing()
            .map(|_| SourceStatus::Processing)
            .map_err(|_| invalid_transition(state, event)),
        (SourceStatus::Failed, StatusTransition::BeginProcessing) => failed()
            .begin_processing()
            .map(|_| SourceStatus::Processing)
            .map_err(|_| invalid_transition(state, event)),
        (SourceStatus::Processing, StatusTransition::Complete) => processing()
            .complete()
            .map(|_| SourceStatus::Complete)
            .map_err(|_| invalid_transition(state, event)),
        (SourceStatus::Processing, StatusTransition::Fail) => processing()
            .fail()
            .map(|_| SourceStatus::Failed)
            .map_err(|_| invalid_transition(state, event)),
        (state, event) => Err(invalid_transition(state, event)),
    }
}

stored_object!(Source, "source", {
    /// Owning tenant. Isolation is enforced through this indexed field.
    tenant_id: String,
    source_type: SourceType,
    title: String,
    /// Author order is meaningful and preserved as given.
    authors: Vec<String>,
    origin_path: String,
    status: SourceStatus,
    metadata: Option<serde_json::Value>,
    category: SourceCategory,
    tags: Vec<String>,
    year: Option<i32>,
    schema_version: String
});

impl Source {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: String,
        source_type: SourceType,
        title: String,
        authors: Vec<String>,
        origin_path: String,
        metadata: Option<serde_json::Value>,
        category: SourceCategory,
        tags: Vec<String>,
        year: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        let mut tags = tags;
        tags.sort();
        tags.dedup();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            source_type,
            title,
            authors,
            origin_path,
            status: SourceStatus::Pending,
            metadata,
            category,
            tags,
            year,
            schema_version: schema::current_version(schema::Entity::Source).to_owned(),
        }
    }

    /// Compute the next status for a transition, rejecting illegal moves.
    pub fn next_status(&self, target: SourceStatus) -> Result<SourceStatus, AppError> {
        let event = match target {
            SourceStatus::Processing => StatusTransition::BeginProcessing,
            SourceStatus::Complete => StatusTransition::Complete,
            SourceStatus::Failed => StatusTransition::Fail,
            SourceStatus::Pending => {
                return Err(AppError::Validation(
                    "source status cannot move back to Pending".into(),
                ))
            }
        };
        compute_next_status(self.status, event)
    }
}
