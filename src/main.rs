use std::path::Path;
use std::process;
use sylva::params::ParameterDatabase;
use sylva::state::{EvolutionState, RunResult};

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "regression.params".to_string());
    log::info!("Loading parameters from '{}'", path);

    let parameters = match ParameterDatabase::from_file(Path::new(&path)) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to load parameter file: {}", e);
            process::exit(2);
        }
    };

    let mut state = EvolutionState::new(parameters);
    match state.run() {
        Ok(RunResult::Success) => process::exit(0),
        Ok(_) => process::exit(1),
        Err(e) => {
            log::error!("Run aborted: {}", e);
            process::exit(2);
        }
    }
}
