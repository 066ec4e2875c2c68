pub mod coordinator;
pub mod identity;
pub mod normalizer;
pub mod push_stream;
pub mod router;

pub use coordinator::LifecycleCoordinator;
pub use identity::{IdentityAcquirer, TokenCallback};
pub use normalizer::MessageNormalizer;
pub use push_stream::{PushStream, PushSubscription};
pub use router::{PathState, RouteOutcome, StateRouter};
