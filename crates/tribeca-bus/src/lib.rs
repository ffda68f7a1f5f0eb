//! Message bus wiring components to each other and to operators.
//!
//! Every topic has at most one snapshot generator and at most one receive
//! handler. Subscribers get the snapshot first and then every message
//! published after it, in publish order. A `BatchPolicy` can defer
//! delivery of chosen publishers to a periodic flush.

pub mod batch;
pub mod bus;
pub mod compression;
pub mod error;
pub mod observable;
pub mod topic;

pub use batch::BatchPolicy;
pub use bus::{MessageBus, Publisher, Receiver, Subscription};
pub use compression::WireEncode;
pub use error::{BusError, BusResult};
pub use observable::Observable;
pub use topic::Topic;
