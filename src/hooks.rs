use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::error::UnknownEvent;

/// A chat message as seen by the interception hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Before a message leaves the client.
    Send,
    /// Before an incoming message is handed to the client.
    Receive,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Send => "send",
            Event::Receive => "receive",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "send" => Ok(Event::Send),
            "receive" => Ok(Event::Receive),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

type Stage = Arc<dyn Fn(&mut Message) + Send + Sync>;

struct Registration {
    id: u64,
    event: Event,
    stage: Stage,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    stages: Vec<Registration>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stages run against a message before it is sent or received.
#[derive(Clone, Default)]
pub struct MessagePipeline {
    registry: Arc<Mutex<Registry>>,
}

impl MessagePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `stage` to the end of the `event` chain. The stage stays
    /// installed until the returned [`Disposer`] is invoked.
    pub fn register<F>(&self, event: Event, stage: F) -> Disposer
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.stages.push(Registration {
            id,
            event,
            stage: Arc::new(stage),
        });
        debug!(id, event = %event, "Registered message stage");

        Disposer {
            registry: Arc::downgrade(&self.registry),
            id,
            disposed: AtomicBool::new(false),
        }
    }

    /// Runs every stage registered for `event`, in registration order.
    pub fn dispatch(&self, event: Event, message: &mut Message) {
        // Snapshot so a stage may register or dispose without deadlocking.
        let stages: Vec<Stage> = lock(&self.registry)
            .stages
            .iter()
            .filter(|r| r.event == event)
            .map(|r| Arc::clone(&r.stage))
            .collect();

        for stage in stages {
            stage(message);
        }
    }

    pub fn stage_count(&self, event: Event) -> usize {
        lock(&self.registry)
            .stages
            .iter()
            .filter(|r| r.event == event)
            .count()
    }
}

/// Uninstalls one stage. Safe to call any number of times, and after the
/// pipeline itself is gone.
pub struct Disposer {
    registry: Weak<Mutex<Registry>>,
    id: u64,
    disposed: AtomicBool,
}

impl Disposer {
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).stages.retain(|r| r.id != self.id);
            debug!(id = self.id, "Disposed message stage");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
