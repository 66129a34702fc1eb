//! Event dispatch.
//!
//! The listener table is keyed by event kind, built once, and shared for the
//! life of the process through [`Dispatcher::global`]. Listeners receive the
//! worker the event is addressed to, so the table survives version updates.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use ringside_core::{Error, Request, Response};
use url::Url;

use crate::lifetime::ExtendableEvent;
use crate::push::Notification;
use crate::sync::{SyncOutcome, SyncTag};
use crate::worker::ServiceWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Sync,
    Push,
    NotificationClick,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Sync => "sync",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push { data: Option<Bytes> },
    NotificationClick { notification_id: u64, action: Option<String> },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install => EventKind::Install,
            Event::Activate => EventKind::Activate,
            Event::Fetch(_) => EventKind::Fetch,
            Event::Sync { .. } => EventKind::Sync,
            Event::Push { .. } => EventKind::Push,
            Event::NotificationClick { .. } => EventKind::NotificationClick,
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    /// Names of the partitions evicted by activation.
    Activated(Vec<String>),
    Response(Response),
    Synced(SyncOutcome),
    NotificationShown { id: u64, notification: Notification },
    /// Where a notification click navigated, if anywhere.
    Navigated(Option<Url>),
}

type Listener =
    Box<dyn Fn(Arc<ServiceWorker>, Event, ExtendableEvent) -> BoxFuture<'static, Result<EventOutcome, Error>> + Send + Sync>;

pub struct Dispatcher {
    listeners: HashMap<EventKind, Listener>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("kinds", &self.listeners.keys().collect::<Vec<_>>()).finish()
    }
}

fn misrouted(expected: EventKind, event: &Event) -> Error {
    Error::InvalidInput(format!("{} event delivered to the {expected} listener", event.kind()))
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Build the table with a listener for every event kind.
    pub fn new() -> Self {
        let mut dispatcher = Self { listeners: HashMap::new() };

        dispatcher.on(EventKind::Install, |worker, _, _| async move {
            worker.install().await?;
            Ok(EventOutcome::Installed)
        });

        dispatcher.on(EventKind::Activate, |worker, _, _| async move {
            worker.activate().await.map(EventOutcome::Activated)
        });

        dispatcher.on(EventKind::Fetch, |worker, event, extendable| async move {
            match event {
                Event::Fetch(request) => worker.handle_fetch(request, &extendable).await.map(EventOutcome::Response),
                other => Err(misrouted(EventKind::Fetch, &other)),
            }
        });

        dispatcher.on(EventKind::Sync, |worker, event, _| async move {
            match event {
                Event::Sync { tag } => {
                    let tag: SyncTag = tag.parse()?;
                    worker.handle_sync(tag).await.map(EventOutcome::Synced)
                }
                other => Err(misrouted(EventKind::Sync, &other)),
            }
        });

        dispatcher.on(EventKind::Push, |worker, event, _| async move {
            match event {
                Event::Push { data } => {
                    let (id, notification) = worker.handle_push(data.as_deref()).await?;
                    Ok(EventOutcome::NotificationShown { id, notification })
                }
                other => Err(misrouted(EventKind::Push, &other)),
            }
        });

        dispatcher.on(EventKind::NotificationClick, |worker, event, _| async move {
            match event {
                Event::NotificationClick { notification_id, action } => worker
                    .handle_notification_click(notification_id, action.as_deref())
                    .await
                    .map(EventOutcome::Navigated),
                other => Err(misrouted(EventKind::NotificationClick, &other)),
            }
        });

        dispatcher
    }

    /// The process-wide table.
    pub fn global() -> &'static Dispatcher {
        static TABLE: LazyLock<Dispatcher> = LazyLock::new(Dispatcher::new);
        &TABLE
    }

    fn on<F, Fut>(&mut self, kind: EventKind, listener: F)
    where
        F: Fn(Arc<ServiceWorker>, Event, ExtendableEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<EventOutcome, Error>> + Send + 'static,
    {
        self.listeners.insert(kind, Box::new(move |worker, event, extendable| listener(worker, event, extendable).boxed()));
    }

    /// Deliver an event to `worker`. Work the listener extends the event
    /// with is tracked on `extendable`.
    pub async fn dispatch(
        &self, worker: &Arc<ServiceWorker>, event: Event, extendable: &ExtendableEvent,
    ) -> Result<EventOutcome, Error> {
        let kind = event.kind();
        let listener = self.listeners.get(&kind).ok_or_else(|| Error::NoListener(kind.to_string()))?;
        tracing::debug!(%kind, version = %worker.version(), "Dispatching event");
        listener(Arc::clone(worker), event, extendable.clone()).await
    }

    /// Deliver an event and wait for everything it was extended with.
    pub async fn dispatch_and_settle(&self, worker: &Arc<ServiceWorker>, event: Event) -> Result<EventOutcome, Error> {
        let extendable = ExtendableEvent::new();
        let outcome = self.dispatch(worker, event, &extendable).await;
        extendable.settled().await;
        outcome
    }
}
