use std::sync::Arc;

use crate::options::GenerationOptions;

/// How a candidate is compared against the cached options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Field-by-field equality.
    #[default]
    Structural,
    /// Equality of the JSON payloads that would be sent.
    Serialized,
}

/// Last options adopted by a session.
#[derive(Debug, Default)]
pub struct OptionsCache {
    strategy: CacheStrategy,
    current: Option<Entry>,
}

#[derive(Clone, Debug)]
struct Entry {
    options: Arc<GenerationOptions>,
    // Only populated for `Serialized`.
    payload: Option<String>,
}

impl OptionsCache {
    pub fn new(strategy: CacheStrategy) -> Self {
        Self {
            strategy,
            current: None,
        }
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    pub fn get(&self) -> Option<&Arc<GenerationOptions>> {
        self.current.as_ref().map(|e| &e.options)
    }

    pub fn matches(&self, candidate: &GenerationOptions) -> bool {
        let Some(entry) = &self.current else {
            return false;
        };
        match self.strategy {
            CacheStrategy::Structural => *entry.options == *candidate,
            CacheStrategy::Serialized => entry.payload == payload_of(candidate),
        }
    }

    /// Adopt `options`, returning the entry it replaced.
    pub fn replace(&mut self, options: Arc<GenerationOptions>) -> Option<Arc<GenerationOptions>> {
        let payload = match self.strategy {
            CacheStrategy::Structural => None,
            CacheStrategy::Serialized => payload_of(&options),
        };
        self.current
            .replace(Entry { options, payload })
            .map(|e| e.options)
    }

    /// Put back a previous entry (or clear) after a failed or refused request.
    pub fn restore(&mut self, previous: Option<Arc<GenerationOptions>>) {
        match previous {
            Some(options) => {
                self.replace(options);
            }
            None => self.current = None,
        }
    }
}

fn payload_of(options: &GenerationOptions) -> Option<String> {
    serde_json::to_string(options).ok()
}
