//! The offline cache router.
//!
//! Every request a page makes is classified by URL and answered from a
//! versioned cache, the network, or both:
//!
//! - [`rules`] decides what kind of request it is
//! - [`worker`] runs the matching strategy and the install/activate lifecycle
//! - [`sync`] and [`push`] handle background sync and push messages
//! - [`events`] routes each event kind to its listener
//! - [`registration`] tracks which version is in control
//!
//! The router reaches the outside world only through [`host::Host`].

pub mod events;
pub mod host;
pub mod lifetime;
pub mod partitions;
pub mod push;
pub mod registration;
pub mod rules;
pub mod sync;
pub mod worker;

pub use events::{Dispatcher, Event, EventKind, EventOutcome};
pub use host::{Clients, Host, NotificationCenter, Notifier, ShownNotification, WindowClient, WindowClients};
pub use lifetime::ExtendableEvent;
pub use partitions::{PartitionKind, PartitionNames};
pub use push::{Notification, PushPayload};
pub use registration::Registration;
pub use rules::{Category, RuleSet, Strategy};
pub use sync::{SyncOutcome, SyncTag};
pub use worker::{SCOPE, ServiceWorker, WorkerSettings, WorkerState};
