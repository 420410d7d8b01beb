//! Request flow around the rule engine and the offset coordinator.
//!
//! A request enters through [`Ingress`], is filtered by [`PolicyStage`] onto
//! the output topic, has its stream offset recorded by [`TopicOffsetStage`]
//! and is read back by [`FilteredResourceStage`] once the coordinator knows
//! where it starts. Failures are published as [`AuditErrorEvent`]s.

pub mod audit;
pub mod error;
pub mod filtered;
pub mod ingress;
pub mod model;
pub mod offset_stage;
pub mod pipeline;
pub mod policy_stage;
pub mod users;

pub use audit::AuditReporter;
pub use error::StageError;
pub use filtered::{FilteredResourceStage, RecordFilter};
pub use ingress::Ingress;
pub use model::{AuditErrorEvent, AuthorisedResource, DataRequest};
pub use offset_stage::TopicOffsetStage;
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineDeps, DEFAULT_OFFSET_TTL, ERROR_TOPIC, OUTPUT_TOPIC,
    REQUEST_TOPIC,
};
pub use policy_stage::PolicyStage;
pub use users::{InMemoryUserDirectory, UserDirectory};

#[cfg(test)]
mod tests;
