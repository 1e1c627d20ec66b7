use super::KeyValueBackend;
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local backend. An optional quota bounds the total bytes of keys
/// plus values, the way browser storage enforces a per-origin limit.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    slots: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Removes every slot.
    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory backend lock poisoned"))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory backend lock poisoned"))?;

        if let Some(quota) = self.quota_bytes {
            let others: usize = slots
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            anyhow::ensure!(
                needed <= quota,
                "storage quota exceeded ({needed} > {quota} bytes)"
            );
        }

        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
