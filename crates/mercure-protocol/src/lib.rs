//! Wire-level types shared by every hub component: the update envelope,
//! topic selector matching, and the HTTP error envelope.

mod error;
mod topic;
mod update;

pub use error::{error_codes, HttpErrorEnvelope, HubError};
pub use topic::{any_selector_matches, CompiledTemplate, TemplateCompileError, TopicSelector};
pub use update::{BuildUpdateError, RawPublishForm, Update, parse_publish_form};
