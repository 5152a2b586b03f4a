//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod llm_router;
pub mod pg_collaborators;
pub mod scheduled_tasks;
pub mod serper_client;
pub mod sse;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;
pub mod url_checker;

pub use deps::ServerDeps;
pub use llm_router::LlmRouter;
pub use pg_collaborators::{PgDocumentLoader, PgNotifier, PgProposalCreator};
pub use serper_client::{NoopSearchService, SerperClient};
pub use stream_hub::StreamHub;
pub use test_dependencies::TestDependencies;
pub use traits::*;
pub use url_checker::HttpUrlChecker;
