//! Domain model (ids, envelope, naming, state, outcome, errors).
//!
//! I/O を一切持たない層です。投入側とワーカーの両方がここを共有します。

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod naming;
pub mod outcome;
pub mod state;

pub use self::envelope::{EnvelopeError, JobEnvelope};
pub use self::errors::{ErrorKind, JobError, RetrievalError, SubmitError};
pub use self::ids::{JobId, JobIdError};
pub use self::naming::{Stem, UnknownStem, input_key, output_key};
pub use self::outcome::JobReport;
pub use self::state::JobState;
