//! Lifecycle events and server-pushed event subscriptions.

mod lifecycle;
pub(crate) mod subscription;

pub use lifecycle::LifecycleEvent;
pub use subscription::{
    ClientSubscription, ClusterSubscription, ClusterSubscriptionBuilder, EventHandler,
};
