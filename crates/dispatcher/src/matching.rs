//! Per-request matching: template by keyword score, model by catalog
//! lookup, agent by resource compatibility.
//!
//! Everything here is synchronous and works on rows already loaded for
//! the current cycle.

use relay_core::compat::{self, Compatibility, ModelRequirements};
use relay_core::error::CoreError;
use relay_core::resources::ResourceSnapshot;
use relay_core::scoring;
use relay_core::types::DbId;
use relay_db::models::agent_status::AgentStatus;
use relay_db::models::model_spec::ModelSpec;
use relay_db::models::prompt_template::PromptTemplate;

/// An agent row reduced to what matching needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCandidate {
    pub name: String,
    pub resources: ResourceSnapshot,
    pub active_model: Option<String>,
}

impl TryFrom<&AgentStatus> for AgentCandidate {
    type Error = CoreError;

    fn try_from(row: &AgentStatus) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.agent_name.clone(),
            resources: row.resources()?,
            active_model: row.active_model.clone(),
        })
    }
}

/// Outcome of matching one request.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Assign {
        prompt_id: DbId,
        score: u32,
        model: String,
        agent: String,
    },
    /// No active dispatch template exists.
    NoTemplate,
    /// The selected template names no model.
    NoPreferredModel { prompt_id: DbId },
    /// The template's model is not in the active catalog.
    UnknownModel { prompt_id: DbId, model: String },
    /// No fresh agent can serve the model right now.
    NoCompatibleAgent { prompt_id: DbId, model: String },
}

/// Pick the template with the strictly highest score for `text`.
///
/// The first template sets the baseline, so a request that matches no
/// keyword at all still gets the first template.
pub fn select_template<'a>(
    templates: &'a [PromptTemplate],
    text: &str,
) -> Option<(&'a PromptTemplate, u32)> {
    scoring::select_best(templates.iter().map(|template| {
        let score = scoring::score(&template.tags, &template.content, text);
        (template, score.total())
    }))
}

/// Exact-name catalog lookup.
pub fn find_model<'a>(models: &'a [ModelSpec], name: &str) -> Option<&'a ModelSpec> {
    models.iter().find(|model| model.name == name)
}

/// First agent, in load order, that can serve `model`.
pub fn select_agent<'a>(
    agents: &'a [AgentCandidate],
    model: &ModelRequirements,
) -> Option<&'a AgentCandidate> {
    agents.iter().find(|agent| {
        let verdict = compat::check(&agent.resources, agent.active_model.as_deref(), model);
        match &verdict {
            Compatibility::Resident | Compatibility::Suitable => true,
            rejected => {
                tracing::debug!(
                    agent = %agent.name,
                    model = %model.name,
                    reason = ?rejected,
                    "Agent rejected for model",
                );
                false
            }
        }
    })
}

/// Match one request against the rows loaded for this cycle.
pub fn decide(
    text: &str,
    templates: &[PromptTemplate],
    models: &[ModelSpec],
    agents: &[AgentCandidate],
) -> MatchDecision {
    let Some((template, score)) = select_template(templates, text) else {
        return MatchDecision::NoTemplate;
    };

    let Some(model_name) = template.preferred_model.as_deref().filter(|m| !m.is_empty()) else {
        return MatchDecision::NoPreferredModel {
            prompt_id: template.id,
        };
    };

    let Some(model) = find_model(models, model_name) else {
        return MatchDecision::UnknownModel {
            prompt_id: template.id,
            model: model_name.to_string(),
        };
    };

    match select_agent(agents, &model.requirements()) {
        Some(agent) => MatchDecision::Assign {
            prompt_id: template.id,
            score,
            model: model.name.clone(),
            agent: agent.name.clone(),
        },
        None => MatchDecision::NoCompatibleAgent {
            prompt_id: template.id,
            model: model.name.clone(),
        },
    }
}
