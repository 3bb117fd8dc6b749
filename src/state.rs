use crate::breed::{BreedContext, Breeder, SetupContext};
use crate::eval::Evaluator;
use crate::output::{EcError, Output};
use crate::params::{Parameter, ParameterDatabase};
use crate::pop::Population;
use crate::registry::Registry;
use crate::stats::Statistics;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;

/// How a run ended: the success criterion was met, or the generation
/// budget ran out first. `NotDone` only circulates inside the loop; `run`
/// never returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Success,
    Failure,
    NotDone,
}

/// Builds the initial population.
pub trait Initializer: fmt::Debug {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError>;

    fn initial_population(
        &mut self,
        ctx: &mut SetupContext<'_>,
        rng: &mut StdRng,
    ) -> Result<Population, EcError>;
}

/// Sets up the population from its parameters and fills every slot with
/// freshly grown individuals.
#[derive(Debug, Default)]
pub struct SimpleInitializer;

impl Initializer for SimpleInitializer {
    fn setup(&mut self, _ctx: &mut SetupContext<'_>, _base: &Parameter) -> Result<(), EcError> {
        Ok(())
    }

    fn initial_population(
        &mut self,
        ctx: &mut SetupContext<'_>,
        rng: &mut StdRng,
    ) -> Result<Population, EcError> {
        let mut pop = Population::setup(ctx)?;
        pop.populate(rng);
        Ok(pop)
    }
}

/// Closing hook, invoked once the terminal result is known.
pub trait Finisher: fmt::Debug {
    fn finish_population(
        &mut self,
        pop: Option<&Population>,
        result: RunResult,
        output: &mut Output,
    );
}

#[derive(Debug, Default)]
pub struct SimpleFinisher;

impl Finisher for SimpleFinisher {
    fn finish_population(
        &mut self,
        pop: Option<&Population>,
        result: RunResult,
        output: &mut Output,
    ) {
        let individuals = pop.map(|p| p.total_individuals()).unwrap_or(0);
        output.message(&format!(
            "Run finished: {result:?}; final population of {individuals} individuals"
        ));
    }
}

/// The top-level run state: parameters, output, the singleton components
/// and the generation loop that ties them together.
///
/// A generation evaluates the current population, then either stops
/// (success criterion met, or this was the last generation) or breeds a
/// replacement population and advances the counter. Components live in
/// `Option` slots so the loop can lend the rest of the state to them while
/// they work.
#[derive(Debug)]
pub struct EvolutionState {
    pub parameters: ParameterDatabase,
    pub output: Output,
    pub registry: Registry,
    pub random: Vec<StdRng>,
    pub population: Option<Population>,
    pub generation: usize,
    pub evaluations: u64,
    num_generations: Option<usize>,
    evaluation_budget: Option<u64>,
    initializer: Option<Box<dyn Initializer>>,
    finisher: Box<dyn Finisher>,
    breeder: Option<Box<dyn Breeder>>,
    evaluator: Option<Box<dyn Evaluator>>,
    statistics: Option<Box<dyn Statistics>>,
    configured: bool,
}

impl EvolutionState {
    pub const P_GENERATIONS: &'static str = "generations";
    pub const P_EVALUATIONS: &'static str = "evaluations";
    pub const P_SEED: &'static str = "seed";
    pub const P_INIT: &'static str = "init";
    pub const P_BREED: &'static str = "breed";
    pub const P_EVAL: &'static str = "eval";
    pub const P_STAT: &'static str = "stat";

    pub fn new(parameters: ParameterDatabase) -> Self {
        Self::with_registry(parameters, Registry::default())
    }

    pub fn with_registry(parameters: ParameterDatabase, registry: Registry) -> Self {
        Self {
            parameters,
            output: Output::new(),
            registry,
            random: Vec::new(),
            population: None,
            generation: 0,
            evaluations: 0,
            num_generations: None,
            evaluation_budget: None,
            initializer: None,
            finisher: Box::new(SimpleFinisher),
            breeder: None,
            evaluator: None,
            statistics: None,
            configured: false,
        }
    }

    /// Reads the run-level parameters and instantiates the singleton
    /// components. Exactly one of `generations` and `evaluations` governs
    /// run length; when both are given the evaluation budget wins.
    pub fn setup(&mut self) -> Result<(), EcError> {
        let gen_param = Parameter::new(Self::P_GENERATIONS);
        let eval_param = Parameter::new(Self::P_EVALUATIONS);

        if self.parameters.exists(&eval_param, None) {
            let budget = self.parameters.get_int(&eval_param, None)?;
            if budget <= 0 {
                return Err(self
                    .output
                    .fatal(&format!("'{eval_param}' must be > 0, got {budget}")));
            }
            self.evaluation_budget = Some(budget as u64);
        }
        if self.parameters.exists(&gen_param, None) {
            let generations = self.parameters.get_int(&gen_param, None)?;
            if generations <= 0 {
                return Err(self
                    .output
                    .fatal(&format!("'{gen_param}' must be > 0, got {generations}")));
            }
            if self.evaluation_budget.is_some() {
                self.output.warning(&format!(
                    "Both '{gen_param}' and '{eval_param}' are defined; '{gen_param}' will be ignored"
                ));
            } else {
                self.num_generations = Some(generations as usize);
            }
        }
        if self.num_generations.is_none() && self.evaluation_budget.is_none() {
            return Err(self.output.fatal(&format!(
                "Either '{gen_param}' or '{eval_param}' must be defined"
            )));
        }

        let seed_param = Parameter::new(Self::P_SEED);
        let rng = if self.parameters.exists(&seed_param, None) {
            let seed = self.parameters.get_int(&seed_param, None)?;
            StdRng::seed_from_u64(seed as u64)
        } else {
            StdRng::from_os_rng()
        };
        self.random = vec![rng];

        let mut initializer = {
            let name = self
                .parameters
                .get_string(&Parameter::new(Self::P_INIT), None)
                .unwrap_or_else(|| "simple".to_string());
            self.registry.initializer_for(&name, &mut self.output)?
        };
        let mut breeder = {
            let name = self
                .parameters
                .get_string(&Parameter::new(Self::P_BREED), None)
                .unwrap_or_else(|| "simple".to_string());
            self.registry.breeder_for(&name, &mut self.output)?
        };
        let mut evaluator = {
            let name = self
                .parameters
                .get_string(&Parameter::new(Self::P_EVAL), None)
                .unwrap_or_else(|| "simple".to_string());
            self.registry.evaluator_for(&name, &mut self.output)?
        };
        let mut statistics = {
            let name = self
                .parameters
                .get_string(&Parameter::new(Self::P_STAT), None)
                .unwrap_or_else(|| "simple".to_string());
            self.registry.statistics_for(&name, &mut self.output)?
        };

        let mut ctx = SetupContext {
            params: &self.parameters,
            output: &mut self.output,
            registry: &self.registry,
        };
        initializer.setup(&mut ctx, &Parameter::new(Self::P_INIT))?;
        breeder.setup(&mut ctx, &Parameter::new(Self::P_BREED))?;
        evaluator.setup(&mut ctx, &Parameter::new(Self::P_EVAL))?;
        statistics.setup(&mut ctx, &Parameter::new(Self::P_STAT))?;
        ctx.output.exit_if_errors()?;

        self.initializer = Some(initializer);
        self.breeder = Some(breeder);
        self.evaluator = Some(evaluator);
        self.statistics = Some(statistics);
        self.configured = true;
        Ok(())
    }

    fn missing(component: &str) -> EcError {
        EcError::Fatal(format!("{component} is not available; was setup run?"))
    }

    /// Builds generation 0 and resolves the run length. An evaluation
    /// budget is converted to whole generations: a budget smaller than one
    /// generation becomes a single generation, and a budget that does not
    /// divide evenly is truncated, both with a warning.
    pub fn start_fresh(&mut self) -> Result<(), EcError> {
        if !self.configured {
            self.setup()?;
        }
        self.output.message("Initializing Generation 0");

        let mut initializer = self.initializer.take().ok_or_else(|| Self::missing("Initializer"))?;
        let pop = {
            let mut ctx = SetupContext {
                params: &self.parameters,
                output: &mut self.output,
                registry: &self.registry,
            };
            initializer.initial_population(&mut ctx, &mut self.random[0])?
        };
        self.initializer = Some(initializer);

        if let Some(budget) = self.evaluation_budget {
            let generation_size = pop.total_individuals() as u64;
            let generations = if budget < generation_size {
                self.output.warning(&format!(
                    "The evaluation budget {budget} is smaller than one generation \
                     ({generation_size} individuals); running a single generation"
                ));
                1
            } else {
                if budget % generation_size != 0 {
                    self.output.warning(&format!(
                        "The evaluation budget {budget} is not a multiple of the generation \
                         size {generation_size}; truncating to {}",
                        (budget / generation_size) * generation_size
                    ));
                }
                budget / generation_size
            };
            self.num_generations = Some(generations as usize);
            self.evaluation_budget = Some(generations * generation_size);
            self.output
                .message(&format!("The run will last {generations} generations"));
        }

        let mut statistics = self.statistics.take().ok_or_else(|| Self::missing("Statistics"))?;
        statistics.post_initialization(&pop, &mut self.output);
        self.statistics = Some(statistics);

        self.population = Some(pop);
        self.generation = 0;
        self.evaluations = 0;
        Ok(())
    }

    /// One turn of the loop: evaluate, check the two stopping conditions,
    /// otherwise breed a replacement population.
    pub fn evolve(&mut self) -> Result<RunResult, EcError> {
        if self.generation > 0 {
            self.output
                .message(&format!("Generation {}", self.generation));
        }

        let mut evaluator = self.evaluator.take().ok_or_else(|| Self::missing("Evaluator"))?;
        let mut statistics = self.statistics.take().ok_or_else(|| Self::missing("Statistics"))?;
        let outcome = (|| {
            let pop = self
                .population
                .as_mut()
                .ok_or_else(|| Self::missing("Population"))?;
            self.evaluations += evaluator.evaluate_population(pop)?;
            statistics.post_evaluation(pop, self.generation, &mut self.output);
            Ok::<bool, EcError>(evaluator.run_complete(pop))
        })();
        self.evaluator = Some(evaluator);
        self.statistics = Some(statistics);
        let complete = outcome?;

        if complete {
            self.output.message("Found an ideal individual");
            return Ok(RunResult::Success);
        }
        let num_generations = self
            .num_generations
            .ok_or_else(|| Self::missing("Run length"))?;
        if self.generation + 1 >= num_generations {
            return Ok(RunResult::Failure);
        }

        let mut breeder = self.breeder.take().ok_or_else(|| Self::missing("Breeder"))?;
        let bred = {
            let pop = self
                .population
                .as_ref()
                .ok_or_else(|| Self::missing("Population"))?;
            let mut ctx = BreedContext {
                population: pop,
                rng: &mut self.random[0],
                output: &mut self.output,
            };
            breeder.breed_population(&mut ctx)
        };
        self.breeder = Some(breeder);
        self.population = Some(bred?);

        self.generation += 1;
        Ok(RunResult::NotDone)
    }

    /// Post-run cleanup: final statistics, then the finisher. Runs for
    /// success and failure alike.
    pub fn finish(&mut self, result: RunResult) -> Result<(), EcError> {
        let mut statistics = self.statistics.take().ok_or_else(|| Self::missing("Statistics"))?;
        let outcome = match self.population.as_ref() {
            Some(pop) => statistics.final_statistics(pop, result, &mut self.output),
            None => Ok(()),
        };
        self.statistics = Some(statistics);
        outcome?;

        self.output
            .message(&format!("Performed {} evaluations", self.evaluations));
        self.finisher
            .finish_population(self.population.as_ref(), result, &mut self.output);
        Ok(())
    }

    /// The whole top-level run.
    pub fn run(&mut self) -> Result<RunResult, EcError> {
        self.start_fresh()?;
        let result = loop {
            match self.evolve()? {
                RunResult::NotDone => continue,
                done => break done,
            }
        };
        self.finish(result)?;
        Ok(result)
    }
}
