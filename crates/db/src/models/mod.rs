pub mod agent_status;
pub mod model_spec;
pub mod prompt_template;
pub mod request;
pub mod transition;
