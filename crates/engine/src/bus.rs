// SPDX-License-Identifier: MIT

//! The send/recv value bus: holds the latest published values for every
//! resource's output ports and tracks, per recv-binding, whether the
//! bound value changed since the consumer last observed it.

use mgmt_core::{RecvPort, Uid, Value};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Key identifying one output port: the publishing resource's uid plus
/// the port name it was sent under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PortKey {
    source: Uid,
    port: String,
}

struct Slot {
    value: Value,
    /// Bumped on every `publish`; compared against the consumer's last
    /// observed generation to compute `RecvPort::changed`.
    generation: u64,
}

/// One consumer's binding: which `(source uid, port)` feeds a recv port
/// it declared, and the generation it last observed.
#[derive(Debug, Clone)]
pub struct Binding {
    pub port: String,
    pub source: Uid,
    pub source_port: String,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<PortKey, Slot>,
    observed: HashMap<(Uid, String), u64>,
}

/// Shared across every reconciliation task; cheap to clone.
#[derive(Clone, Default)]
pub struct Bus {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `values` under `source`'s output ports, bumping the
    /// generation of any port whose value actually changed.
    pub fn publish(&self, source: &Uid, values: HashMap<String, Value>) {
        let mut inner = self.inner.lock();
        for (port, value) in values {
            let key = PortKey { source: source.clone(), port };
            match inner.slots.get_mut(&key) {
                Some(slot) if slot.value == value => {}
                Some(slot) => {
                    slot.value = value;
                    slot.generation += 1;
                }
                None => {
                    inner.slots.insert(key, Slot { value, generation: 1 });
                }
            }
        }
    }

    /// Read the current bindings for `consumer`, marking each as
    /// observed at its current generation as a side effect.
    pub fn recv(&self, consumer: &Uid, bindings: &[Binding]) -> HashMap<String, RecvPort> {
        let mut inner = self.inner.lock();
        let mut out = HashMap::with_capacity(bindings.len());
        for binding in bindings {
            let key = PortKey { source: binding.source.clone(), port: binding.source_port.clone() };
            let Some(slot) = inner.slots.get(&key) else { continue };
            let observed_key = (consumer.clone(), binding.port.clone());
            let last_seen = inner.observed.get(&observed_key).copied().unwrap_or(0);
            let changed = slot.generation > last_seen;
            out.insert(
                binding.port.clone(),
                RecvPort { value: slot.value.clone(), changed },
            );
            inner.observed.insert(observed_key, slot.generation);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uid(name: &str) -> Uid {
        Uid::name("test", name)
    }

    #[test]
    fn first_recv_after_publish_is_marked_changed() {
        let bus = Bus::new();
        let source = uid("producer");
        bus.publish(&source, HashMap::from([("out".to_string(), json!(1))]));

        let bindings = vec![Binding {
            port: "in".to_string(),
            source: source.clone(),
            source_port: "out".to_string(),
        }];
        let recv = bus.recv(&uid("consumer"), &bindings);
        assert_eq!(recv["in"].value, json!(1));
        assert!(recv["in"].changed);
    }

    #[test]
    fn second_recv_without_republish_is_unchanged() {
        let bus = Bus::new();
        let source = uid("producer");
        bus.publish(&source, HashMap::from([("out".to_string(), json!(1))]));

        let consumer = uid("consumer");
        let bindings =
            vec![Binding { port: "in".to_string(), source: source.clone(), source_port: "out".to_string() }];
        let _ = bus.recv(&consumer, &bindings);
        let second = bus.recv(&consumer, &bindings);
        assert!(!second["in"].changed);
    }

    #[test]
    fn republishing_the_same_value_does_not_mark_changed() {
        let bus = Bus::new();
        let source = uid("producer");
        let consumer = uid("consumer");
        let bindings =
            vec![Binding { port: "in".to_string(), source: source.clone(), source_port: "out".to_string() }];

        bus.publish(&source, HashMap::from([("out".to_string(), json!(1))]));
        let _ = bus.recv(&consumer, &bindings);
        bus.publish(&source, HashMap::from([("out".to_string(), json!(1))]));
        let second = bus.recv(&consumer, &bindings);
        assert!(!second["in"].changed);
    }

    #[test]
    fn republishing_a_different_value_marks_changed_again() {
        let bus = Bus::new();
        let source = uid("producer");
        let consumer = uid("consumer");
        let bindings =
            vec![Binding { port: "in".to_string(), source: source.clone(), source_port: "out".to_string() }];

        bus.publish(&source, HashMap::from([("out".to_string(), json!(1))]));
        let _ = bus.recv(&consumer, &bindings);
        bus.publish(&source, HashMap::from([("out".to_string(), json!(2))]));
        let second = bus.recv(&consumer, &bindings);
        assert!(second["in"].changed);
        assert_eq!(second["in"].value, json!(2));
    }

    #[test]
    fn unbound_port_is_absent_rather_than_default() {
        let bus = Bus::new();
        let bindings = vec![Binding {
            port: "in".to_string(),
            source: uid("nobody"),
            source_port: "out".to_string(),
        }];
        let recv = bus.recv(&uid("consumer"), &bindings);
        assert!(!recv.contains_key("in"));
    }
}
