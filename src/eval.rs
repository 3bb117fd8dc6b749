use crate::breed::SetupContext;
use crate::output::EcError;
use crate::params::Parameter;
use crate::pop::{Individual, Population};
use log::debug;
use rayon::prelude::*;
use std::fmt;

/// A fitness landscape. Implementations are shared read-only across the
/// evaluation worker pool, so they must be `Send + Sync` and `evaluate`
/// must not mutate.
pub trait Problem: fmt::Debug + Send + Sync {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError>;

    /// Scores one individual. Larger is better.
    fn evaluate(&self, ind: &Individual) -> f64;
}

/// Symbolic regression of the quartic polynomial x^4 + x^3 + x^2 + x over
/// evenly spaced sample points. Fitness is 1 / (1 + total absolute error),
/// so a perfect program scores 1.0.
#[derive(Debug)]
pub struct RegressionProblem {
    cases: Vec<(f64, f64)>,
    num_registers: usize,
}

impl RegressionProblem {
    pub const P_CASES: &'static str = "cases";
    pub const P_RANGE_MIN: &'static str = "range-min";
    pub const P_RANGE_MAX: &'static str = "range-max";
    pub const P_REGISTERS: &'static str = "registers";

    fn target(x: f64) -> f64 {
        x * x * x * x + x * x * x + x * x + x
    }

    /// Runs the individual's trees in order against one input. The register
    /// file starts zeroed per case; the last tree's result is the program's
    /// prediction.
    fn predict(&self, ind: &Individual, x: f64) -> f64 {
        let inputs = [x];
        let mut registers = vec![0.0; self.num_registers];
        let mut prediction = 0.0;
        for tree in &ind.trees {
            prediction = tree.execute(&inputs, &mut registers);
        }
        prediction
    }
}

impl Default for RegressionProblem {
    fn default() -> Self {
        Self {
            cases: Vec::new(),
            num_registers: 1,
        }
    }
}

impl Problem for RegressionProblem {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        let cases = ctx
            .params
            .get_int_with_default(&base.push(Self::P_CASES), None, 20)?;
        if cases < 1 {
            return Err(ctx
                .output
                .fatal(&format!("Regression needs at least one case, got {cases}")));
        }
        let min = ctx
            .params
            .get_double_with_default(&base.push(Self::P_RANGE_MIN), None, -1.0)?;
        let max = ctx
            .params
            .get_double_with_default(&base.push(Self::P_RANGE_MAX), None, 1.0)?;
        if max <= min {
            return Err(ctx.output.fatal("Regression sample range is empty"));
        }
        let registers =
            ctx.params
                .get_int_with_default(&base.push(Self::P_REGISTERS), None, 1)?;
        if registers < 1 {
            return Err(ctx
                .output
                .fatal("Regression needs at least one program register"));
        }
        self.num_registers = registers as usize;

        let cases = cases as usize;
        let step = (max - min) / (cases.saturating_sub(1).max(1)) as f64;
        self.cases = (0..cases)
            .map(|i| {
                let x = min + step * i as f64;
                (x, Self::target(x))
            })
            .collect();
        Ok(())
    }

    fn evaluate(&self, ind: &Individual) -> f64 {
        let error: f64 = self
            .cases
            .iter()
            .map(|&(x, y)| (self.predict(ind, x) - y).abs())
            .sum();
        if error.is_finite() {
            1.0 / (1.0 + error)
        } else {
            0.0
        }
    }
}

/// Scores a population and decides when the run has succeeded.
pub trait Evaluator: fmt::Debug {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError>;

    /// Evaluates every unevaluated individual in place, returning how many
    /// evaluations were performed.
    fn evaluate_population(&mut self, pop: &mut Population) -> Result<u64, EcError>;

    /// True once any evaluated individual meets its ideal threshold.
    fn run_complete(&self, pop: &Population) -> bool;
}

/// The standard evaluator: fans unevaluated individuals out across the
/// rayon pool and writes fitnesses back in place. Individuals that arrive
/// already evaluated are skipped and not recounted.
#[derive(Debug, Default)]
pub struct SimpleEvaluator {
    problem: Option<Box<dyn Problem>>,
}

impl SimpleEvaluator {
    pub const P_PROBLEM: &'static str = "problem";
}

impl Evaluator for SimpleEvaluator {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        let problem_base = base.push(Self::P_PROBLEM);
        let name = ctx
            .params
            .get_string(&problem_base, None)
            .unwrap_or_else(|| "regression".to_string());
        let mut problem = ctx.registry.problem_for(&name, ctx.output)?;
        problem.setup(ctx, &problem_base)?;
        self.problem = Some(problem);
        Ok(())
    }

    fn evaluate_population(&mut self, pop: &mut Population) -> Result<u64, EcError> {
        let problem = match self.problem.as_deref() {
            Some(p) => p,
            None => return Err(EcError::Fatal("Evaluator used before setup".to_string())),
        };

        let mut evaluations = 0u64;
        for subpop in pop.subpops.iter_mut() {
            let count: u64 = subpop
                .individuals
                .par_iter_mut()
                .filter_map(|slot| slot.as_mut())
                .filter(|ind| !ind.evaluated)
                .map(|ind| {
                    let value = problem.evaluate(ind);
                    ind.fitness.value = value;
                    ind.evaluated = true;
                    1u64
                })
                .sum();
            evaluations += count;
        }
        debug!("Evaluated {evaluations} individuals");
        Ok(evaluations)
    }

    fn run_complete(&self, pop: &Population) -> bool {
        pop.subpops
            .iter()
            .flat_map(|s| s.filled())
            .any(|ind| ind.evaluated && ind.fitness.is_ideal())
    }
}
