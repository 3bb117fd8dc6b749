//! A generational evolutionary-computation engine for register-based
//! program trees.
//!
//! A run is driven by a flat key/value parameter database: the
//! [`state::EvolutionState`] reads its run length, random seed and
//! component choices from it, the [`registry::Registry`] turns component
//! names into instances, and the generation loop alternates population
//! evaluation with pipeline-based breeding until an ideal individual shows
//! up or the generations run out.

pub mod breed;
pub mod eval;
pub mod gp;
pub mod output;
pub mod params;
pub mod pop;
pub mod registry;
pub mod state;
pub mod stats;
