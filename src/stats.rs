use crate::breed::SetupContext;
use crate::output::{EcError, Output};
use crate::params::Parameter;
use crate::pop::{Individual, Population};
use crate::state::RunResult;
use log::info;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Observation hooks threaded through the run loop. Statistics never steer
/// evolution; they only read populations as they pass by.
pub trait Statistics: fmt::Debug {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError>;

    fn post_initialization(&mut self, _pop: &Population, _output: &mut Output) {}

    fn post_evaluation(&mut self, _pop: &Population, _generation: usize, _output: &mut Output) {}

    fn final_statistics(
        &mut self,
        pop: &Population,
        result: RunResult,
        output: &mut Output,
    ) -> Result<(), EcError>;
}

#[derive(Debug, Serialize)]
struct BestOfRunReport {
    result: String,
    subpopulation: usize,
    generation: usize,
    fitness: f64,
    program: String,
}

/// Logs per-generation progress and tracks the best individual seen across
/// the whole run, optionally writing it out as JSON at the end.
#[derive(Debug, Default)]
pub struct SimpleStatistics {
    file: Option<PathBuf>,
    best: Option<(usize, usize, Individual)>,
}

impl SimpleStatistics {
    pub const P_FILE: &'static str = "file";

    fn record_best(&mut self, pop: &Population, generation: usize) {
        for (s, subpop) in pop.subpops.iter().enumerate() {
            for ind in subpop.filled() {
                if !ind.evaluated {
                    continue;
                }
                let beats_current = self
                    .best
                    .as_ref()
                    .is_none_or(|(_, _, b)| ind.fitness.better_than(&b.fitness));
                if beats_current {
                    self.best = Some((s, generation, ind.clone()));
                }
            }
        }
    }
}

impl Statistics for SimpleStatistics {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        self.file = ctx
            .params
            .get_string(&base.push(Self::P_FILE), None)
            .map(PathBuf::from);
        Ok(())
    }

    fn post_evaluation(&mut self, pop: &Population, generation: usize, output: &mut Output) {
        self.record_best(pop, generation);
        if let Some((_, _, best)) = &self.best {
            output.message(&format!(
                "Generation {generation}: best fitness so far {:.6}",
                best.fitness.value
            ));
        }
    }

    fn final_statistics(
        &mut self,
        _pop: &Population,
        result: RunResult,
        output: &mut Output,
    ) -> Result<(), EcError> {
        let Some((subpopulation, generation, best)) = &self.best else {
            output.warning("No evaluated individual was ever observed");
            return Ok(());
        };
        output.message(&format!(
            "Best individual of run (fitness {:.6}): {best}",
            best.fitness.value
        ));

        if let Some(path) = &self.file {
            let report = BestOfRunReport {
                result: format!("{result:?}"),
                subpopulation: *subpopulation,
                generation: *generation,
                fitness: best.fitness.value,
                program: best.to_string(),
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| EcError::Fatal(format!("Failed to serialize report: {e}")))?;
            fs::write(path, json).map_err(|e| {
                EcError::Fatal(format!("Failed to write {}: {e}", path.display()))
            })?;
            info!("Wrote best-of-run report to {}", path.display());
        }
        Ok(())
    }
}
