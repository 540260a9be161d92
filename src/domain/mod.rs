//! 领域模型模块

pub mod deploy;
pub mod webhook;

pub use deploy::{DeployOutcome, SubstitutionContext};
pub use webhook::{interpret, Interpretation, WebhookEvent, PUSH_ARTIFACT};
