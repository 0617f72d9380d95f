//! Error type
use crate::irl::IrlError;
use crate::planning::PlanningError;
use thiserror::Error;

/// Error from the MLIRL crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("error while planning")]
    Planning(#[from] PlanningError),
    #[error("error during inverse reinforcement learning")]
    Irl(#[from] IrlError),
}
