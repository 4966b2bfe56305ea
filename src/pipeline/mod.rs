//! Command-dispatch pipeline.
//!
//! Every unread message flows through:
//! 1. `normalize::extract()`: sender, subject and date in canonical form
//! 2. `command::parse()`: `infodump` or `task:parameter`
//! 3. `Gate::admit()`: known sender, cooldown elapsed
//! 4. `Dispatcher::dispatch()`: role-specific reply, forward or rejection
//! 5. `Composer::deliver()`: MIME composition, transmitted unless dry-run
//!
//! **Rejections are silent.** A dropped request never gets a reply.

pub mod command;
pub mod composer;
pub mod dispatch;
pub mod gate;
pub mod normalize;
pub mod poll;

pub use composer::{ComposedMessage, Composer, Delivery};
pub use dispatch::{Action, Decision, Dispatcher, Response};
pub use gate::Gate;
pub use normalize::{InboundMessage, normalize};
pub use poll::{CycleReport, MessageOutcome, PollLoop};
