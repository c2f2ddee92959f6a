//! Mix server: parses and forwards messages for one relay within a single
//! round, whichever phase that round is currently in.

mod checkpoint;
mod error;
mod onion;
mod path_establishment;
mod pool;
mod round;

pub use checkpoint::{CheckpointResponder, CheckpointSender, VerificationKeyTable};
pub use error::{Result, ServerError};
pub use onion::{LightningRouter, OnionParser};
pub use path_establishment::{PathEstablishmentParser, PathOutcome};
pub use pool::{Job, JobHandler, JobMeta, WorkPool};
pub use round::{LayerSender, Orchestrator, RoundConfig, RoundPhase};
