use crate::breed::crossover::CrossoverPipeline;
use crate::breed::mutation::MutationPipeline;
use crate::breed::reproduction::ReproductionPipeline;
use crate::breed::select::TournamentSelection;
use crate::breed::{Breeder, SimpleBreeder, SourceHandle};
use crate::eval::{Evaluator, Problem, RegressionProblem, SimpleEvaluator};
use crate::output::{EcError, Output};
use crate::state::{Initializer, SimpleInitializer};
use crate::stats::{SimpleStatistics, Statistics};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Maps the short names used in parameter files to component constructors.
/// Each capability has its own table, so a name only ever resolves against
/// the capability a parameter actually asks for. Custom components register
/// here before the run is set up.
#[derive(Debug)]
pub struct Registry {
    sources: HashMap<String, fn() -> SourceHandle>,
    breeders: HashMap<String, fn() -> Box<dyn Breeder>>,
    evaluators: HashMap<String, fn() -> Box<dyn Evaluator>>,
    initializers: HashMap<String, fn() -> Box<dyn Initializer>>,
    statistics: HashMap<String, fn() -> Box<dyn Statistics>>,
    problems: HashMap<String, fn() -> Box<dyn Problem>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
            breeders: HashMap::new(),
            evaluators: HashMap::new(),
            initializers: HashMap::new(),
            statistics: HashMap::new(),
            problems: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut r = Self::empty();
        r.register_source("tournament", || {
            Rc::new(RefCell::new(TournamentSelection::new()))
        });
        r.register_source("crossover", || {
            Rc::new(RefCell::new(CrossoverPipeline::default()))
        });
        r.register_source("mutation", || {
            Rc::new(RefCell::new(MutationPipeline::default()))
        });
        r.register_source("reproduction", || {
            Rc::new(RefCell::new(ReproductionPipeline::default()))
        });
        r.register_breeder("simple", || Box::new(SimpleBreeder));
        r.register_evaluator("simple", || Box::<SimpleEvaluator>::default());
        r.register_initializer("simple", || Box::new(SimpleInitializer));
        r.register_statistics("simple", || Box::<SimpleStatistics>::default());
        r.register_problem("regression", || Box::<RegressionProblem>::default());
        r
    }

    pub fn register_source(&mut self, name: &str, ctor: fn() -> SourceHandle) {
        self.sources.insert(name.to_string(), ctor);
    }

    pub fn register_breeder(&mut self, name: &str, ctor: fn() -> Box<dyn Breeder>) {
        self.breeders.insert(name.to_string(), ctor);
    }

    pub fn register_evaluator(&mut self, name: &str, ctor: fn() -> Box<dyn Evaluator>) {
        self.evaluators.insert(name.to_string(), ctor);
    }

    pub fn register_initializer(&mut self, name: &str, ctor: fn() -> Box<dyn Initializer>) {
        self.initializers.insert(name.to_string(), ctor);
    }

    pub fn register_statistics(&mut self, name: &str, ctor: fn() -> Box<dyn Statistics>) {
        self.statistics.insert(name.to_string(), ctor);
    }

    pub fn register_problem(&mut self, name: &str, ctor: fn() -> Box<dyn Problem>) {
        self.problems.insert(name.to_string(), ctor);
    }

    fn unknown(output: &mut Output, capability: &str, name: &str) -> EcError {
        output.fatal(&format!("No {capability} is registered under '{name}'"))
    }

    pub fn source_for(&self, name: &str, output: &mut Output) -> Result<SourceHandle, EcError> {
        match self.sources.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(Self::unknown(output, "breeding source", name)),
        }
    }

    pub fn breeder_for(
        &self,
        name: &str,
        output: &mut Output,
    ) -> Result<Box<dyn Breeder>, EcError> {
        match self.breeders.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(Self::unknown(output, "breeder", name)),
        }
    }

    pub fn evaluator_for(
        &self,
        name: &str,
        output: &mut Output,
    ) -> Result<Box<dyn Evaluator>, EcError> {
        match self.evaluators.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(Self::unknown(output, "evaluator", name)),
        }
    }

    pub fn initializer_for(
        &self,
        name: &str,
        output: &mut Output,
    ) -> Result<Box<dyn Initializer>, EcError> {
        match self.initializers.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(Self::unknown(output, "initializer", name)),
        }
    }

    pub fn statistics_for(
        &self,
        name: &str,
        output: &mut Output,
    ) -> Result<Box<dyn Statistics>, EcError> {
        match self.statistics.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(Self::unknown(output, "statistics", name)),
        }
    }

    pub fn problem_for(
        &self,
        name: &str,
        output: &mut Output,
    ) -> Result<Box<dyn Problem>, EcError> {
        match self.problems.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(Self::unknown(output, "problem", name)),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve() {
        let registry = Registry::default();
        let mut output = Output::new();
        assert!(registry.source_for("tournament", &mut output).is_ok());
        assert!(registry.source_for("crossover", &mut output).is_ok());
        assert!(registry.source_for("mutation", &mut output).is_ok());
        assert!(registry.source_for("reproduction", &mut output).is_ok());
        assert!(registry.breeder_for("simple", &mut output).is_ok());
        assert!(registry.evaluator_for("simple", &mut output).is_ok());
        assert!(registry.problem_for("regression", &mut output).is_ok());
    }

    #[test]
    fn test_unknown_name_is_fatal() {
        let registry = Registry::default();
        let mut output = Output::new();
        let result = registry.source_for("annealing", &mut output);
        assert!(matches!(result, Err(EcError::Fatal(_))));
    }

    #[test]
    fn test_names_resolve_per_capability() {
        // "simple" names a breeder, not a breeding source.
        let registry = Registry::default();
        let mut output = Output::new();
        assert!(registry.source_for("simple", &mut output).is_err());
        assert!(registry.breeder_for("tournament", &mut output).is_err());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = Registry::empty();
        registry.register_breeder("simple", || Box::new(SimpleBreeder));
        let mut output = Output::new();
        assert!(registry.breeder_for("simple", &mut output).is_ok());
        assert!(registry.evaluator_for("simple", &mut output).is_err());
    }
}
