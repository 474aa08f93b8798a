//! Error-swallowing `decide`/`initialize` layer over [`Client`].
//!
//! Hosts that evaluate flags through a decide-style hook want a value or nothing,
//! never an error. The adapter resolves a value from each flag, logs failures and
//! hands them to an optional callback instead of propagating them.

use std::sync::Arc;

use log::error;
use serde_json::Value;

use crate::flag::Flag;
use crate::{Client, FlagError};

pub type ValueResolver<V> = Arc<dyn Fn(&Flag) -> Option<V> + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&FlagError) + Send + Sync>;

/// Whether `initialize` warms the cache with every flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefetch {
    #[default]
    None,
    All,
}

pub struct FlagAdapter<V> {
    client: Client,
    resolver: ValueResolver<V>,
    on_error: Option<ErrorHandler>,
    prefetch: Prefetch,
}

impl FlagAdapter<Value> {
    /// Resolves the payload when present, otherwise the `enabled` bit.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resolver: Arc::new(default_value),
            on_error: None,
            prefetch: Prefetch::None,
        }
    }
}

impl<V> FlagAdapter<V> {
    pub fn with_resolver<W, F>(self, resolver: F) -> FlagAdapter<W>
    where
        F: Fn(&Flag) -> Option<W> + Send + Sync + 'static,
    {
        FlagAdapter {
            client: self.client,
            resolver: Arc::new(resolver),
            on_error: self.on_error,
            prefetch: self.prefetch,
        }
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&FlagError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Warms the cache when prefetching is enabled; a no-op otherwise.
    pub async fn initialize(&self) {
        if self.prefetch != Prefetch::All {
            return;
        }

        if let Err(e) = self.client.list_flags().await {
            self.report(&e);
        }
    }

    pub async fn decide(&self, key: &str) -> Option<V> {
        match self.client.get_flag(key).await {
            Ok(Some(flag)) => (self.resolver)(&flag),
            Ok(None) => None,
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// The flag's `enabled` bit; missing flags and failures read as disabled.
    pub async fn enabled(&self, key: &str) -> bool {
        match self.client.get_flag(key).await {
            Ok(flag) => flag.is_some_and(|f| f.enabled),
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    fn report(&self, e: &FlagError) {
        error!("Failed to resolve flag value: {}", e);
        if let Some(on_error) = &self.on_error {
            on_error(e);
        }
    }
}

fn default_value(flag: &Flag) -> Option<Value> {
    Some(
        flag.payload
            .clone()
            .unwrap_or(Value::Bool(flag.enabled)),
    )
}
