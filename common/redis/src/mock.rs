use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::{Client, CustomRedisError};

#[derive(Clone, Debug)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
}

/// Records every call made against it so tests can assert on call shape, not
/// just return values. Results default to the "nothing configured yet" case
/// (e.g. a key that was never marked reports `exists == false`) rather than
/// erroring, since that's the behavior callers should be coded against.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    present_keys: Arc<Mutex<HashSet<String>>>,
    counters: Arc<Mutex<HashMap<String, i64>>>,
    forced_errors: Arc<Mutex<HashMap<String, CustomRedisError>>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_present(self, key: &str) -> Self {
        self.present_keys.lock().unwrap().insert(key.to_owned());
        self
    }

    pub fn with_counter(self, key: &str, value: i64) -> Self {
        self.counters.lock().unwrap().insert(key.to_owned(), value);
        self
    }

    pub fn fail_on(self, key: &str, err: CustomRedisError) -> Self {
        self.forced_errors
            .lock()
            .unwrap()
            .insert(key.to_owned(), err);
        self
    }

    pub fn calls(&self) -> Vec<MockRedisCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, key: &str) {
        self.calls.lock().unwrap().push(MockRedisCall {
            op: op.to_string(),
            key: key.to_string(),
        });
    }

    fn check_forced(&self, key: &str) -> Result<(), CustomRedisError> {
        if let Some(err) = self.forced_errors.lock().unwrap().get(key) {
            return Err(err.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn exists(&self, k: String) -> Result<bool, CustomRedisError> {
        self.record("exists", &k);
        self.check_forced(&k)?;
        Ok(self.present_keys.lock().unwrap().contains(&k))
    }

    async fn set_nx_ex(
        &self,
        k: String,
        _v: String,
        _seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        self.record("set_nx_ex", &k);
        self.check_forced(&k)?;
        let mut present = self.present_keys.lock().unwrap();
        if present.contains(&k) {
            Ok(false)
        } else {
            present.insert(k);
            Ok(true)
        }
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        self.record("incr", &k);
        self.check_forced(&k)?;
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(k).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn expire(&self, k: String, _seconds: i64) -> Result<(), CustomRedisError> {
        self.record("expire", &k);
        self.check_forced(&k)
    }

    async fn exists_batch(&self, ks: Vec<String>) -> Result<Vec<bool>, CustomRedisError> {
        let mut out = Vec::with_capacity(ks.len());
        for k in ks {
            out.push(self.exists(k).await?);
        }
        Ok(out)
    }

    async fn set_nx_ex_batch(
        &self,
        entries: Vec<(String, String)>,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        for (k, v) in entries {
            self.set_nx_ex(k, v, seconds).await?;
        }
        Ok(())
    }
}
