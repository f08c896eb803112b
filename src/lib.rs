//! Multi-objective calibration of an external simulator.
//!
//! The simulator is a black box behind a line protocol on its standard
//! streams ([`channel`]). The search is NSGA-II ([`nsga2`]) with every
//! evaluated solution offered to an epsilon-dominance archive
//! ([`archive`]), whose contents are the result of a run.

pub mod archive;
pub mod channel;
pub mod config;
pub mod dominance;
pub mod error;
pub mod evaluator;
pub mod individual;
pub mod io;
pub mod nsga2;
pub mod problem;
pub mod variation;


pub use archive::EpsilonArchive;
pub use channel::ProcessChannel;
pub use error::{CalibrationError, ProtocolError};
pub use evaluator::{Evaluator, Simulator};
pub use individual::Individual;
pub use nsga2::{Nsga2, SearchConfig, SearchOutcome, SearchState};
pub use problem::{Bound, Evaluation, ProblemSpec};
