//! Handler registry: the set of registered handlers and the three topic
//! channels that index them (§3, §4.3, §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::EventAdminError;
use crate::filter::{self, Filter};
use crate::handler::{DeliveryMode, EventHandler, HandlerDescriptor};
use crate::properties::Properties;
use crate::topic::{self, Pattern};

/// One channel: the handler ids subscribed to a given topic key.
type Channel = Vec<i64>;

#[derive(Default)]
struct RegistryState {
    handlers: HashMap<i64, Arc<HandlerDescriptor>>,
    all_channel: Channel,
    exact_channels: HashMap<String, Channel>,
    prefix_channels: HashMap<String, Channel>,
}

/// Where a handler id was inserted, so a failed registration can be rolled
/// back precisely (§4.3: "either the handler appears in every channel its
/// patterns imply, or it appears in none").
enum ChannelLoc {
    All,
    Exact(String),
    Prefix(String),
}

/// The registry's reader-writer-locked state plus the operations over it.
pub struct Registry {
    state: RwLock<RegistryState>,
    max_prefix_len: usize,
}

/// Registration request, corresponding to the recognized properties in §6.
pub struct HandlerRegistration {
    pub service_id: i64,
    pub service: Box<dyn EventHandler>,
    pub topics: String,
    pub description: Option<String>,
    pub delivery: Option<String>,
    pub filter: Option<String>,
}

impl Registry {
    /// `max_prefix_len` bounds both subscription prefixes (§4.1) and the
    /// topics that participate in prefix matching (§4.4); it mirrors
    /// [`crate::config::EventAdminConfig::max_prefix_len`].
    #[must_use]
    pub fn new(max_prefix_len: usize) -> Self {
        Self { state: RwLock::new(RegistryState::default()), max_prefix_len }
    }

    /// §4.3 `add_handler`.
    pub fn add_handler(&self, reg: HandlerRegistration) -> Result<(), EventAdminError> {
        if reg.service_id < 0 {
            return Err(EventAdminError::invalid_argument("service id is missing or negative"));
        }
        if reg.topics.trim().is_empty() {
            return Err(EventAdminError::invalid_argument("event.topics property is required"));
        }

        let patterns = topic::parse_topics(&reg.topics, self.max_prefix_len);
        if patterns.is_empty() {
            return Err(EventAdminError::invalid_argument(
                "event.topics contained no usable subscription pattern",
            ));
        }
        let compiled_filter: Option<Filter> =
            reg.filter.as_deref().map(filter::compile).transpose()?;
        let delivery_mode = DeliveryMode::from_property(reg.delivery.as_deref());
        let description = reg.description.unwrap_or_else(|| "Unknown".to_string());

        let descriptor = Arc::new(HandlerDescriptor::new(
            reg.service_id,
            reg.service,
            description.clone(),
            delivery_mode,
            compiled_filter,
        ));

        let mut state = self.state.write();
        if state.handlers.contains_key(&reg.service_id) {
            return Err(EventAdminError::invalid_argument(format!(
                "service id {} already registered",
                reg.service_id
            )));
        }

        let mut inserted: Vec<ChannelLoc> = Vec::new();
        for pattern in &patterns {
            let result = match pattern {
                Pattern::All => {
                    push_checked(&mut state.all_channel, reg.service_id).map(|()| ChannelLoc::All)
                }
                Pattern::Exact(topic) => {
                    push_checked(state.exact_channels.entry(topic.clone()).or_default(), reg.service_id)
                        .map(|()| ChannelLoc::Exact(topic.clone()))
                }
                Pattern::Prefix(prefix) => {
                    push_checked(
                        state.prefix_channels.entry(prefix.clone()).or_default(),
                        reg.service_id,
                    )
                    .map(|()| ChannelLoc::Prefix(prefix.clone()))
                }
            };
            match result {
                Ok(loc) => inserted.push(loc),
                Err(err) => {
                    rollback(&mut state, reg.service_id, &inserted);
                    return Err(err);
                }
            }
        }

        state.handlers.insert(reg.service_id, descriptor);
        debug!(service_id = reg.service_id, %description, topics = %reg.topics, "added event handler");
        Ok(())
    }

    /// §4.3 `remove_handler`. A no-op if the id is not present.
    pub fn remove_handler(&self, service_id: i64) {
        let mut state = self.state.write();
        let Some(descriptor) = state.handlers.remove(&service_id) else {
            return;
        };
        unsubscribe(&mut state.all_channel, service_id);
        remove_from_channels(&mut state.exact_channels, service_id);
        remove_from_channels(&mut state.prefix_channels, service_id);
        debug!(service_id, description = %descriptor.description, "removed event handler");
    }

    /// §4.4 dispatch planner: the deduplicated set of handlers that should
    /// receive an event, after filter and blacklist checks. Takes a
    /// recursive read lock so that a handler calling `send` re-entrantly
    /// (§4.5, §9) does not deadlock against itself.
    pub fn plan(&self, topic: &str, properties: &Properties) -> Vec<Arc<HandlerDescriptor>> {
        let state = self.state.read_recursive();
        let mut seen = std::collections::HashSet::new();
        let mut planned = Vec::new();

        collect(&state, &state.all_channel, topic, properties, &mut seen, &mut planned);

        if !state.prefix_channels.is_empty() {
            for prefix in topic::ancestor_prefixes(topic, self.max_prefix_len) {
                if let Some(channel) = state.prefix_channels.get(prefix) {
                    collect(&state, channel, topic, properties, &mut seen, &mut planned);
                }
            }
            if topic.len() > self.max_prefix_len {
                warn!(%topic, "topic exceeds max prefix length, skipping prefix-channel phase");
            }
        }

        if let Some(channel) = state.exact_channels.get(topic) {
            collect(&state, channel, topic, properties, &mut seen, &mut planned);
        }

        planned
    }

    /// Look up a single handler by id, used by the worker pool once it has
    /// claimed an in-flight slot for that id (§4.6 step 3). Takes a fresh
    /// (non-recursive) read lock since workers never hold it re-entrantly.
    #[must_use]
    pub fn lookup(&self, service_id: i64) -> Option<Arc<HandlerDescriptor>> {
        self.state.read().handlers.get(&service_id).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().handlers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(crate::topic::MAX_PREFIX_LEN)
    }
}

fn collect(
    state: &RegistryState,
    channel: &[i64],
    topic: &str,
    properties: &Properties,
    seen: &mut std::collections::HashSet<i64>,
    out: &mut Vec<Arc<HandlerDescriptor>>,
) {
    for &id in channel {
        let Some(descriptor) = state.handlers.get(&id) else { continue };
        if !seen.insert(id) {
            continue;
        }
        if !descriptor.filter_matches(properties) {
            continue;
        }
        if descriptor.is_blacklisted() {
            warn!(service_id = id, %topic, "skipping blacklisted event handler");
            continue;
        }
        out.push(descriptor.clone());
    }
}

fn push_checked(channel: &mut Channel, service_id: i64) -> Result<(), EventAdminError> {
    channel
        .try_reserve(1)
        .map_err(|e| EventAdminError::out_of_memory(e.to_string()))?;
    channel.push(service_id);
    Ok(())
}

fn unsubscribe(channel: &mut Channel, service_id: i64) {
    channel.retain(|&id| id != service_id);
}

fn remove_from_channels(channels: &mut HashMap<String, Channel>, service_id: i64) {
    channels.retain(|_, channel| {
        unsubscribe(channel, service_id);
        !channel.is_empty()
    });
}

fn rollback(state: &mut RegistryState, service_id: i64, inserted: &[ChannelLoc]) {
    for loc in inserted {
        match loc {
            ChannelLoc::All => unsubscribe(&mut state.all_channel, service_id),
            ChannelLoc::Exact(topic) => {
                if let Some(channel) = state.exact_channels.get_mut(topic) {
                    unsubscribe(channel, service_id);
                    if channel.is_empty() {
                        state.exact_channels.remove(topic);
                    }
                }
            }
            ChannelLoc::Prefix(prefix) => {
                if let Some(channel) = state.prefix_channels.get_mut(prefix) {
                    unsubscribe(channel, service_id);
                    if channel.is_empty() {
                        state.prefix_channels.remove(prefix);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandleResult;

    struct Noop;
    impl EventHandler for Noop {
        fn handle_event(&self, _topic: &str, _properties: &Properties) -> HandleResult {
            HandleResult::Ok
        }
    }

    fn register(registry: &Registry, id: i64, topics: &str) {
        registry
            .add_handler(HandlerRegistration {
                service_id: id,
                service: Box::new(Noop),
                topics: topics.to_string(),
                description: None,
                delivery: None,
                filter: None,
            })
            .unwrap();
    }

    #[test]
    fn exact_match_finds_handler() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        register(&registry, 1, "org/celix/test");
        let plan = registry.plan("org/celix/test", &Properties::new());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].service_id, 1);
    }

    #[test]
    fn prefix_match_covers_descendants() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        register(&registry, 1, "org/celix/*");
        assert_eq!(registry.plan("org/celix", &Properties::new()).len(), 1);
        assert_eq!(registry.plan("org/celix/test", &Properties::new()).len(), 1);
        assert_eq!(registry.plan("org/celixx", &Properties::new()).len(), 0);
    }

    #[test]
    fn wildcard_matches_everything() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        register(&registry, 1, "*");
        assert_eq!(registry.plan("anything/at/all", &Properties::new()).len(), 1);
    }

    #[test]
    fn remove_handler_unlinks_from_all_channels() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        register(&registry, 1, "org/celix/test,org/celix/*,*");
        registry.remove_handler(1);
        assert!(registry.is_empty());
        assert_eq!(registry.plan("org/celix/test", &Properties::new()).len(), 0);
    }

    #[test]
    fn remove_handler_is_noop_for_unknown_id() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        registry.remove_handler(42);
        assert!(registry.is_empty());
    }

    #[test]
    fn add_handler_rejects_missing_topics() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        let err = registry
            .add_handler(HandlerRegistration {
                service_id: 1,
                service: Box::new(Noop),
                topics: String::new(),
                description: None,
                delivery: None,
                filter: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn add_handler_rejects_negative_service_id() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        let err = registry
            .add_handler(HandlerRegistration {
                service_id: -1,
                service: Box::new(Noop),
                topics: "org/celix/test".to_string(),
                description: None,
                delivery: None,
                filter: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn add_handler_rejects_topics_that_parse_to_nothing() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        let err = registry
            .add_handler(HandlerRegistration {
                service_id: 1,
                service: Box::new(Noop),
                topics: " , ".to_string(),
                description: None,
                delivery: None,
                filter: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_handler_in_multiple_channels_is_deduplicated() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        register(&registry, 1, "org/celix/test,*");
        assert_eq!(registry.plan("org/celix/test", &Properties::new()).len(), 1);
    }

    #[test]
    fn blacklisted_handler_is_skipped() {
        let registry = Registry::new(crate::topic::MAX_PREFIX_LEN);
        register(&registry, 1, "org/celix/test");
        let plan = registry.plan("org/celix/test", &Properties::new());
        plan[0].blacklist();
        assert_eq!(registry.plan("org/celix/test", &Properties::new()).len(), 0);
    }
}
