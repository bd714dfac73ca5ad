//! Session management.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐        ┌───────────────┐
//!  │ SessionRegistry │──owns──▶ SessionActor  │  (one per tenant, runs in a tokio task)
//!  │ (tenant→Handle) │        │  owns state,  │
//!  └────────┬────────┘        │  serializes   │
//!           │                 │  mutations    │
//!           │ clone           └───────▲───────┘
//!           ▼                         │ commands + driver events
//!  ┌─────────────────┐                │
//!  │  SessionHandle  │────────────────┘  (cheap cloneable sender)
//!  └─────────────────┘
//! ```
//!
//! - **SessionActor** — owns the tenant's automation client, pairing state,
//!   and recurring schedule; processes commands and driver events one at a
//!   time so no locks are held across await points.
//! - **SessionHandle** — cloneable reference that sends commands to an actor.
//! - **SessionRegistry** — maps tenant ids to handles; creation is
//!   idempotent and a session lives for the process lifetime.
//!
//! Recurring sends run on a dedicated tick task per session (see
//! [`dispatch`]): the tick gates on a state snapshot instead of queueing
//! behind the actor, so a manual send and a firing tick may interleave their
//! network calls in either order.

mod actor;
mod actor_types;
mod dispatch;
mod handle;
mod registry;

pub use actor::SessionActor;
pub use actor_types::{ActorConfig, SessionError, StatusSnapshot};
pub use handle::SessionHandle;
pub use registry::SessionRegistry;
