mod context;
mod observation;
mod observer;
mod reflector;
mod session;
mod store;
mod workspace;

pub use context::{
    OBSERVATION_BLOCK_END, OBSERVATION_BLOCK_START, SESSION_BLOCK_END, SESSION_BLOCK_START,
    block1, build,
};
pub use observation::{Observation, Priority, parse_entry, parse_log, relative_date};
pub use observer::{OBSERVER_SYSTEM_PROMPT, Observer};
pub use reflector::{REFLECTOR_SYSTEM_PROMPT, Reflector};
pub use session::{SessionBuffer, SessionMessage};
pub use store::{OBSERVATIONS_FILENAME, ObservationLog};
pub use workspace::{init_runs_dir, init_storage};
