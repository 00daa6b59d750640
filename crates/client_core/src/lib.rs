//! Client core: purges the messages an account authored across its DMs and guilds.
//!
//! [`Session`] binds a credential to a [`PlatformApi`] client, [`ChannelCatalog`] lists what the
//! account can select, and [`DeletionEngine`] runs the purge in the background, reporting through
//! a [`RunHandle`].

pub mod api;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod events;
pub mod pacing;
pub mod session;

pub use api::{ClientConfig, HttpApiClient, PlatformApi, DEFAULT_API_BASE_URL};
pub use catalog::{Catalog, ChannelCatalog};
pub use engine::{DeletionEngine, EngineOptions, PageFaultPolicy, DEFAULT_DELETE_PACING};
pub use error::ClientError;
pub use events::{
    CancelFlag, ProgressEvent, RunEvent, RunHandle, RunObserver, RunOutcome, RunState, RunSummary,
    TargetError, GLOBAL_TARGET_NAME,
};
pub use pacing::{Sleeper, TokioSleeper};
pub use session::{Credential, Session};

#[cfg(test)]
#[path = "tests/fake_api.rs"]
mod fake_api;
