pub mod crossover;
pub mod mutation;
pub mod reproduction;
pub mod select;

use crate::output::{EcError, Output};
use crate::params::{Parameter, ParameterDatabase};
use crate::pop::{Individual, Population};
use crate::registry::Registry;
use log::debug;
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a breeding source. Pipeline slots may alias (the `same`
/// marker), and identity comparisons on the handle are what let aliased
/// slots skip redundant per-source work, so sources live behind `Rc`.
pub type SourceHandle = Rc<RefCell<dyn BreedingSource>>;

/// Everything a component needs while being configured.
pub struct SetupContext<'a> {
    pub params: &'a ParameterDatabase,
    pub output: &'a mut Output,
    pub registry: &'a Registry,
}

/// Everything a source needs while producing one generation: the old
/// population (read-only for the whole pass) and this worker's rng.
pub struct BreedContext<'a> {
    pub population: &'a Population,
    pub rng: &'a mut StdRng,
    pub output: &'a mut Output,
}

/// A component able to supply individuals for a new population, by
/// selection, synthesis or recombination.
///
/// `produce` writes owned individuals into `inds[start..]` and returns how
/// many it produced (between `min` and `max`). Every source that selects
/// out of the current population clones on read: no reference from the old
/// generation may ever be aliased into the new one, at any pipeline depth.
pub trait BreedingSource: fmt::Debug {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError>;

    /// How many individuals one `produce` call typically yields.
    fn typical_inds_produced(&self) -> usize;

    fn prepare_to_produce(
        &mut self,
        _ctx: &mut BreedContext<'_>,
        _subpop: usize,
    ) -> Result<(), EcError> {
        Ok(())
    }

    fn finish_producing(
        &mut self,
        _ctx: &mut BreedContext<'_>,
        _subpop: usize,
    ) -> Result<(), EcError> {
        Ok(())
    }

    fn produce(
        &mut self,
        min: usize,
        max: usize,
        start: usize,
        subpop: usize,
        inds: &mut [Option<Individual>],
        ctx: &mut BreedContext<'_>,
    ) -> Result<usize, EcError>;

    /// Deep clone behind a fresh handle. Pipelines preserve the aliasing
    /// structure of their child slots.
    fn clone_source(&self) -> SourceHandle;

    /// True for sources that select existing individuals rather than
    /// synthesize fresh ones.
    fn is_selection_method(&self) -> bool {
        false
    }
}

pub const V_SAME: &str = "same";
pub const P_LIKELIHOOD: &str = "likelihood";
pub const P_NUM_SOURCES: &str = "num-sources";
pub const P_SOURCE: &str = "source";

/// The child-source array and likelihood gate shared by every concrete
/// pipeline.
///
/// Consecutive slots configured as `same` hold the literal same source (one
/// shared node in the pipeline graph, not a duplicate), which setup, the
/// production aggregates and the prepare/finish hooks all honor by skipping
/// a slot that aliases its predecessor.
#[derive(Debug)]
pub struct PipelineSources {
    pub likelihood: f64,
    pub sources: Vec<SourceHandle>,
}

impl Default for PipelineSources {
    fn default() -> Self {
        Self {
            likelihood: 1.0,
            sources: Vec::new(),
        }
    }
}

impl PipelineSources {
    /// Reads `likelihood`, the source count and the `source.<i>` slots from
    /// beneath `base`. `fixed` is the pipeline's hard-coded arity; `None`
    /// means the arity is dynamic and `num-sources` must be configured.
    pub fn setup(
        ctx: &mut SetupContext<'_>,
        base: &Parameter,
        fixed: Option<usize>,
    ) -> Result<Self, EcError> {
        let likelihood =
            ctx.params
                .get_double_with_default(&base.push(P_LIKELIHOOD), None, 1.0)?;
        if !(0.0..=1.0).contains(&likelihood) {
            return Err(ctx.output.fatal(&format!(
                "Pipeline likelihood must be between 0.0 and 1.0 inclusive, got {likelihood} at '{}'",
                base.push(P_LIKELIHOOD)
            )));
        }

        let num_param = base.push(P_NUM_SOURCES);
        let num_sources = match fixed {
            Some(n) => {
                if ctx.params.exists(&num_param, None) {
                    ctx.output.warning(&format!(
                        "Pipeline source count is hard-coded to {n}; '{num_param}' will be ignored"
                    ));
                }
                n
            }
            None => {
                let n = ctx.params.get_int(&num_param, None)?;
                if n < 0 {
                    return Err(ctx
                        .output
                        .fatal(&format!("'{num_param}' must be >= 0, got {n}")));
                }
                n as usize
            }
        };

        let mut sources: Vec<SourceHandle> = Vec::with_capacity(num_sources);
        for x in 0..num_sources {
            let p = base.push(P_SOURCE).push(&x.to_string());
            let name = ctx.params.get_required_string(&p, None)?;
            if name == V_SAME {
                if x == 0 {
                    return Err(ctx
                        .output
                        .fatal(&format!("Source #0 cannot be declared '{V_SAME}' at '{p}'")));
                }
                sources.push(Rc::clone(&sources[x - 1]));
            } else {
                let source = ctx.registry.source_for(&name, ctx.output)?;
                source.borrow_mut().setup(ctx, &p)?;
                sources.push(source);
            }
        }
        ctx.output.exit_if_errors()?;

        Ok(Self {
            likelihood,
            sources,
        })
    }

    /// True when slot `x` holds the same source object as slot `x - 1`.
    fn aliases_previous(&self, x: usize) -> bool {
        x > 0 && Rc::ptr_eq(&self.sources[x], &self.sources[x - 1])
    }

    fn distinct(&self) -> impl Iterator<Item = &SourceHandle> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(x, _)| !self.aliases_previous(*x))
            .map(|(_, s)| s)
    }

    pub fn min_child_production(&self) -> usize {
        self.distinct()
            .map(|s| s.borrow().typical_inds_produced())
            .min()
            .unwrap_or(0)
    }

    pub fn max_child_production(&self) -> usize {
        self.distinct()
            .map(|s| s.borrow().typical_inds_produced())
            .max()
            .unwrap_or(0)
    }

    /// The pipeline default: as many as the least-producing distinct child.
    pub fn typical_inds_produced(&self) -> usize {
        self.min_child_production()
    }

    pub fn prepare_to_produce(
        &self,
        ctx: &mut BreedContext<'_>,
        subpop: usize,
    ) -> Result<(), EcError> {
        for x in 0..self.sources.len() {
            if !self.aliases_previous(x) {
                self.sources[x].borrow_mut().prepare_to_produce(ctx, subpop)?;
            }
        }
        Ok(())
    }

    pub fn finish_producing(
        &self,
        ctx: &mut BreedContext<'_>,
        subpop: usize,
    ) -> Result<(), EcError> {
        for x in 0..self.sources.len() {
            if !self.aliases_previous(x) {
                self.sources[x].borrow_mut().finish_producing(ctx, subpop)?;
            }
        }
        Ok(())
    }

    /// The pass-through path: asks source 0 for `n` individuals starting at
    /// `start`. Selection sources clone on read, so the filled slots already
    /// own their individuals free of any tie to the old population.
    pub fn reproduce(
        &self,
        n: usize,
        start: usize,
        subpop: usize,
        inds: &mut [Option<Individual>],
        ctx: &mut BreedContext<'_>,
    ) -> Result<usize, EcError> {
        let Some(first) = self.sources.first() else {
            return Err(ctx.output.fatal("Pipeline used before setup: no sources"));
        };
        first.borrow_mut().produce(n, n, start, subpop, inds, ctx)?;
        Ok(n)
    }

    /// Deep-clones the child sources, preserving which slots alias.
    pub fn clone_sources(&self) -> Self {
        let mut sources: Vec<SourceHandle> = Vec::with_capacity(self.sources.len());
        for x in 0..self.sources.len() {
            if self.aliases_previous(x) {
                sources.push(Rc::clone(&sources[x - 1]));
            } else {
                sources.push(self.sources[x].borrow().clone_source());
            }
        }
        Self {
            likelihood: self.likelihood,
            sources,
        }
    }
}

/// Builds the next generation's population from the current one.
pub trait Breeder: fmt::Debug {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError>;

    /// Returns a brand-new population of the same shape as
    /// `ctx.population`. The input population is behind a shared reference
    /// for the whole pass and is never mutated.
    fn breed_population(&mut self, ctx: &mut BreedContext<'_>) -> Result<Population, EcError>;
}

/// The standard generational breeder: per subpopulation, clone the species'
/// pipeline prototype, then run it until the new subpopulation is full.
#[derive(Debug, Default)]
pub struct SimpleBreeder;

impl Breeder for SimpleBreeder {
    fn setup(&mut self, _ctx: &mut SetupContext<'_>, _base: &Parameter) -> Result<(), EcError> {
        Ok(())
    }

    fn breed_population(&mut self, ctx: &mut BreedContext<'_>) -> Result<Population, EcError> {
        let mut new_pop = ctx.population.empty_clone();

        for (subpop_index, subpop) in ctx.population.subpops.iter().enumerate() {
            // Work on a clone so the species' prototype is never mutated.
            let handle = subpop.species.pipe_prototype.borrow().clone_source();
            let mut pipe = handle.borrow_mut();

            pipe.prepare_to_produce(ctx, subpop_index)?;

            let slots = &mut new_pop.subpops[subpop_index].individuals;
            let total = slots.len();
            let mut filled = 0;
            while filled < total {
                let n = pipe.produce(1, total - filled, filled, subpop_index, slots, ctx)?;
                if n == 0 {
                    return Err(ctx
                        .output
                        .fatal("Breeding pipeline produced no individuals"));
                }
                filled += n;
            }
            debug!("Bred subpopulation {subpop_index}: {filled} individuals");

            pipe.finish_producing(ctx, subpop_index)?;
        }

        Ok(new_pop)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::pop::{Species, Subpopulation};
    use crate::registry::Registry;
    use rand::SeedableRng;

    pub fn setup_ctx<'a>(
        params: &'a ParameterDatabase,
        output: &'a mut Output,
        registry: &'a Registry,
    ) -> SetupContext<'a> {
        SetupContext {
            params,
            output,
            registry,
        }
    }

    /// A small evaluated population with one subpopulation, ready to breed.
    pub fn evaluated_population(size: usize, seed: u64) -> Population {
        let params = ParameterDatabase::parse(
            "pop.subpops = 1\n\
             pop.subpop.0.size = 1\n\
             pop.subpop.0.species.pipe = crossover\n\
             pop.subpop.0.species.pipe.source.0 = tournament\n\
             pop.subpop.0.species.pipe.source.1 = same\n",
        )
        .unwrap();
        let mut output = Output::new();
        let registry = Registry::default();
        let mut ctx = setup_ctx(&params, &mut output, &registry);

        let species = Species::setup(
            &mut ctx,
            &Parameter::new("pop").push("subpop").push("0").push("species"),
        )
        .unwrap();

        let mut subpop = Subpopulation {
            species,
            individuals: vec![None; size],
            num_duplicate_retries: 0,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        subpop.populate(&mut rng);
        for (i, slot) in subpop.individuals.iter_mut().enumerate() {
            if let Some(ind) = slot {
                ind.fitness.value = i as f64;
                ind.evaluated = true;
            }
        }
        Population {
            subpops: vec![subpop],
        }
    }

    pub fn snapshot(pop: &Population) -> Vec<Individual> {
        pop.subpops[0].filled().cloned().collect()
    }
}
