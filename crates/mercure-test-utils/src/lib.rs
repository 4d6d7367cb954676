mod sse_client;
mod test_hub;
mod token;

pub use sse_client::{SseClient, SseFrame};
pub use test_hub::{TestHub, TestHubOptions};
pub use token::issue_token;
