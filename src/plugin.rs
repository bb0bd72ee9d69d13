use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::hooks::{Disposer, Event, Message, MessagePipeline};
use crate::record::CleanedUrls;
use crate::sanitizer::RuleEngine;
use crate::scanner::scan;

/// Installs URL cleaning on both the send and receive paths.
pub struct CleanUrlsPlugin {
    engine: RuleEngine,
    record: Arc<Mutex<CleanedUrls>>,
    disposers: Vec<Disposer>,
}

impl CleanUrlsPlugin {
    pub fn new(engine: RuleEngine, record: CleanedUrls) -> Self {
        Self {
            engine,
            record: Arc::new(Mutex::new(record)),
            disposers: Vec::new(),
        }
    }

    /// Shared handle to the cleaned-URL record the hooks write into.
    pub fn record(&self) -> Arc<Mutex<CleanedUrls>> {
        Arc::clone(&self.record)
    }

    pub fn is_loaded(&self) -> bool {
        !self.disposers.is_empty()
    }

    pub fn on_load(&mut self, pipeline: &MessagePipeline) {
        if self.is_loaded() {
            warn!("URL cleaning hooks already installed");
            return;
        }

        for event in [Event::Send, Event::Receive] {
            let engine = self.engine.clone();
            let record = Arc::clone(&self.record);
            let disposer = pipeline.register(event, move |message: &mut Message| {
                clean_message(&engine, &record, message)
            });
            self.disposers.push(disposer);
        }

        info!(rules = self.engine.matchers().len(), "URL cleaning hooks installed");
    }

    pub fn on_unload(&mut self) {
        if self.disposers.is_empty() {
            return;
        }
        for disposer in self.disposers.drain(..) {
            disposer.dispose();
        }
        info!("URL cleaning hooks removed");
    }
}

fn clean_message(engine: &RuleEngine, record: &Mutex<CleanedUrls>, message: &mut Message) {
    if message.content.is_empty() {
        return;
    }

    let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
    let cleaned = match scan(&message.content, engine, &mut *record) {
        Cow::Owned(cleaned) => cleaned,
        Cow::Borrowed(_) => return,
    };
    message.content = cleaned;
}
