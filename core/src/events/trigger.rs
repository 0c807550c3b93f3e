//! Trigger patterns derived from feature set headers

use serde::{Deserialize, Serialize};

use super::{EventKind, LifecyclePhase, RuntimeEvent};

/// Which events a feature set reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerPattern {
    Lifecycle(LifecyclePhase),
    /// Boundary request addressed by operation id (the feature set name)
    Route { operation_id: String },
    /// `<EventName> Handler`
    Domain { event: String },
    /// `File Event Handler`
    File,
    /// `Socket Event Handler`
    Socket,
    /// `<field> StateObserver` or `<field> StateObserver<from_to_to>`
    StateObserver {
        field: String,
        filter: Option<(String, String)>,
    },
}

const OBSERVER: &str = "StateObserver";

impl TriggerPattern {
    /// Derive the pattern from a feature set's name and business activity
    pub fn derive(name: &str, activity: &str) -> TriggerPattern {
        let name = name.trim();
        let activity = activity.trim();

        if name.eq_ignore_ascii_case("Application-Start") {
            return TriggerPattern::Lifecycle(LifecyclePhase::Start);
        }
        if name.eq_ignore_ascii_case("Application-End") {
            let phase = if activity.eq_ignore_ascii_case("error") {
                LifecyclePhase::EndError
            } else {
                LifecyclePhase::EndSuccess
            };
            return TriggerPattern::Lifecycle(phase);
        }
        if let Some(observer) = state_observer(activity) {
            return observer;
        }
        if activity.eq_ignore_ascii_case("File Event Handler") {
            return TriggerPattern::File;
        }
        if activity.eq_ignore_ascii_case("Socket Event Handler") {
            return TriggerPattern::Socket;
        }
        if let Some(event) = activity.strip_suffix(" Handler") {
            let event = event.trim();
            if !event.is_empty() {
                return TriggerPattern::Domain {
                    event: event.to_string(),
                };
            }
        }
        TriggerPattern::Route {
            operation_id: name.to_string(),
        }
    }

    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        match self {
            TriggerPattern::Lifecycle(phase) => {
                event.kind == EventKind::Lifecycle && event.name == phase.event_name()
            }
            TriggerPattern::Route { operation_id } => {
                event.kind == EventKind::Route && &event.name == operation_id
            }
            TriggerPattern::Domain { event: name } => {
                event.kind == EventKind::Domain && &event.name == name
            }
            TriggerPattern::File => event.kind == EventKind::File,
            TriggerPattern::Socket => event.kind == EventKind::Socket,
            TriggerPattern::StateObserver { field, filter } => {
                if event.kind != EventKind::Transition {
                    return false;
                }
                let text = |key: &str| event.payload.get(key).and_then(|v| v.as_str());
                if text("field") != Some(field.as_str()) {
                    return false;
                }
                match filter {
                    None => true,
                    Some((from, to)) => {
                        text("fromState") == Some(from.as_str())
                            && text("toState") == Some(to.as_str())
                    }
                }
            }
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, TriggerPattern::Lifecycle(_))
    }
}

/// `status StateObserver`, `status StateObserver<draft_to_placed>`,
/// `status StateObserver[draft_to_placed]`
fn state_observer(activity: &str) -> Option<TriggerPattern> {
    let at = activity.find(OBSERVER)?;
    let field = activity[..at].trim();
    if field.is_empty() || field.contains(char::is_whitespace) {
        return None;
    }
    let rest = activity[at + OBSERVER.len()..].trim();
    let filter = if rest.is_empty() {
        None
    } else {
        let inner = rest
            .strip_prefix('<')
            .and_then(|r| r.strip_suffix('>'))
            .or_else(|| rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')))?;
        let (from, to) = inner.trim().split_once("_to_")?;
        if from.is_empty() || to.is_empty() {
            return None;
        }
        Some((from.to_string(), to.to_string()))
    };
    Some(TriggerPattern::StateObserver {
        field: field.to_string(),
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::Value;

    fn transition(field: &str, from: &str, to: &str) -> RuntimeEvent {
        RuntimeEvent::new(EventKind::Transition, field)
            .with("field", Value::from(field))
            .with("fromState", Value::from(from))
            .with("toState", Value::from(to))
    }

    #[test]
    fn test_lifecycle_patterns() {
        assert_eq!(
            TriggerPattern::derive("Application-Start", "Shop"),
            TriggerPattern::Lifecycle(LifecyclePhase::Start)
        );
        assert_eq!(
            TriggerPattern::derive("Application-End", "Success"),
            TriggerPattern::Lifecycle(LifecyclePhase::EndSuccess)
        );
        assert_eq!(
            TriggerPattern::derive("Application-End", "Error"),
            TriggerPattern::Lifecycle(LifecyclePhase::EndError)
        );
    }

    #[test]
    fn test_handler_patterns() {
        assert_eq!(
            TriggerPattern::derive("Send Welcome", "UserCreated Handler"),
            TriggerPattern::Domain {
                event: "UserCreated".into()
            }
        );
        assert_eq!(
            TriggerPattern::derive("Watch", "File Event Handler"),
            TriggerPattern::File
        );
        assert_eq!(
            TriggerPattern::derive("Chat", "Socket Event Handler"),
            TriggerPattern::Socket
        );
        assert_eq!(
            TriggerPattern::derive("listUsers", "User API"),
            TriggerPattern::Route {
                operation_id: "listUsers".into()
            }
        );
    }

    #[test]
    fn test_state_observer_patterns() {
        let all = TriggerPattern::derive("Audit", "status StateObserver");
        let placed = TriggerPattern::derive("Notify", "status StateObserver<draft_to_placed>");
        let bracketed = TriggerPattern::derive("Notify", "status StateObserver[draft_to_placed]");
        assert_eq!(placed, bracketed);

        let draft_to_placed = transition("status", "draft", "placed");
        let placed_to_paid = transition("status", "placed", "paid");
        let other_field = transition("payment", "draft", "placed");

        assert!(all.matches(&draft_to_placed));
        assert!(all.matches(&placed_to_paid));
        assert!(!all.matches(&other_field));
        assert!(placed.matches(&draft_to_placed));
        assert!(!placed.matches(&placed_to_paid));
    }

    #[test]
    fn test_malformed_observer_falls_back_to_route() {
        assert_eq!(
            TriggerPattern::derive("Odd", "status StateObserver<draft>"),
            TriggerPattern::Route {
                operation_id: "Odd".into()
            }
        );
    }
}
