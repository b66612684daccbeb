// Authentication module
// Credential storage, request tagging and single-flight refresh

mod coordinator;
mod refresh;
mod storage;
mod store;
mod tagger;
mod teardown;
mod types;

pub use coordinator::{PendingRefresh, RefreshCoordinator, RefreshLease, RefreshOutcome, RefreshTurn};
pub use refresh::{HttpRefresher, Refresher};
pub use storage::{DurableStorage, MemoryStorage, SqliteStorage};
pub use store::CredentialStore;
pub use tagger::RequestTagger;
pub use teardown::{SessionEvent, SessionSignal, SessionTeardown};
pub use types::{AuthResponse, CredentialSnapshot, LoginRequest, RegisterRequest, TOKEN_FIELD};
