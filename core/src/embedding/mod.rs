//! QM/MM embedding of a QM region into a polarizable classical environment.
mod espfit;
mod ewald;
mod machine;
mod polarsite;
mod qmmiter;

pub use espfit::{ChargeMethod, EspFit, EspFitOptions, FitSummary};
pub use ewald::{EnergySplit, Environment, EwaldEnvironment, EwaldOptions, InductionSummary};
pub use machine::{
    select_state, ConvergenceFlags, QmapeConvergence, QmapeMachine, QmapeOptions, QmapeOutcome,
    QmapeTasks, StateFilter,
};
pub use polarsite::{PolarSeg, PolarSite, PolarTopology, QmInterface};
pub use qmmiter::QmmIter;
