pub mod agent_status_repo;
pub mod model_spec_repo;
pub mod prompt_template_repo;
pub mod request_repo;
pub mod transition_repo;

pub use agent_status_repo::AgentStatusRepo;
pub use model_spec_repo::ModelSpecRepo;
pub use prompt_template_repo::PromptTemplateRepo;
pub use request_repo::RequestRepo;
pub use transition_repo::TransitionRepo;
