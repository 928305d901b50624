//! Session driver: login handshake, single command exchange and the
//! stop-on-first-failure command sequencer.

mod command;
mod profile;
pub(crate) mod response;
mod sequencer;
mod session;

pub use command::CommandDescriptor;
pub use profile::Profile;
pub use response::Response;
pub use sequencer::{SequenceReport, Sequencer};
pub use session::{BootstrapState, Session, connect_with_retry};
