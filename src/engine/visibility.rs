use crate::model::Flag;
use serde_json::Value as JsonValue;

/// Evaluate a `hidden`/`disabled` declaration. The global flag wins; a
/// predicate sees the whole document so conditions may cross branches.
pub fn resolve(flag: &Flag, values: &JsonValue, global: bool) -> bool {
    if global {
        return true;
    }
    match flag {
        Flag::Const(b) => *b,
        Flag::When(f) => f(values),
    }
}

pub fn is_hidden(flag: &Flag, values: &JsonValue) -> bool {
    resolve(flag, values, false)
}

/// Hidden/disabled state inherited down the declaration tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    pub hidden: bool,
    pub disabled: bool,
}

impl Scope {
    pub fn root(global_disabled: bool) -> Self {
        Self {
            hidden: false,
            disabled: global_disabled,
        }
    }

    /// Scope of a child node. Predicates are not evaluated once an ancestor
    /// already decided the outcome.
    pub fn enter(self, hidden: &Flag, disabled: Option<&Flag>, values: &JsonValue) -> Scope {
        Scope {
            hidden: self.hidden || is_hidden(hidden, values),
            disabled: match disabled {
                Some(flag) => resolve(flag, values, self.disabled),
                None => self.disabled,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn global_disable_always_wins() {
        let v = json!({});
        assert!(resolve(&Flag::Const(false), &v, true));
        assert!(resolve(&Flag::when(|_| false), &v, true));
        assert!(!resolve(&Flag::Const(false), &v, false));
    }

    #[test]
    fn predicates_see_the_whole_document() {
        let flag = Flag::when(|v| v.get("billing").and_then(|b| b.get("same")) == Some(&json!(true)));
        assert!(is_hidden(&flag, &json!({"billing": {"same": true}})));
        assert!(!is_hidden(&flag, &json!({"billing": {"same": false}})));
    }

    #[test]
    fn scope_inherits_and_short_circuits() {
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let flag = Flag::when(move |_| {
            c.set(c.get() + 1);
            false
        });
        let v = json!({});
        let hidden_parent = Scope::root(false).enter(&Flag::Const(true), None, &v);
        let child = hidden_parent.enter(&flag, None, &v);
        assert!(child.hidden);
        assert_eq!(calls.get(), 0);
        let disabled = Scope::root(true).enter(&Flag::Const(false), Some(&flag), &v);
        assert!(disabled.disabled);
        assert_eq!(calls.get(), 0);
        let plain = Scope::root(false).enter(&Flag::Const(false), Some(&flag), &v);
        assert_eq!(plain, Scope::default());
        assert_eq!(calls.get(), 1);
    }
}
