//! Scenario perturbations and their application to a street graph

pub mod apply;
pub mod perturbation;
pub mod selector;

pub use apply::{ModifiedGraph, PerturbationSummary, apply};
pub use perturbation::{
    Closure, ClosureTarget, Multiplier, Perturbation, Scenario, ScenarioPerturbation,
};
pub use selector::EdgeSelector;
