pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod permissions;
pub mod reconciliation;
pub mod state_machine;
pub mod status;
pub mod sweeper;
pub mod validation;

use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ModerationError;
pub use permissions::Actor;
pub use state_machine::store::ModerationStore;
pub use validation::{EventDraft, EventPatch};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_service_version() -> String {
    // First check for git hash from a packaged build environment
    if let Some(git_hash) = option_env!("EVENTGATE_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        // Fall back to built crate's git detection (for cargo builds)
        short_hash(git_hash)
    } else {
        "unknown".to_string()
    }
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub struct AppState {
    pub store: Arc<ModerationStore>,
}
