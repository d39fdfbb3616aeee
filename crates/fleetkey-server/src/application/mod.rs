//! Application layer: session registry and command routing.
//!
//! This layer holds the server's behavior — which devices exist, which are
//! alive, and how a control command becomes a sequence of keyboard reports —
//! expressed against the [`DeviceTransport`] seam so none of it depends on
//! real sockets.

pub mod registry;
pub mod router;
pub mod transport;

pub use registry::{RegistryError, SessionRegistry};
pub use router::{
    Command, CommandRouter, CommandTarget, Delivery, DispatchError, RouteError, RouterConfig,
    RoutingResult, TargetOutcome,
};
pub use transport::{DeviceTransport, SendError};
