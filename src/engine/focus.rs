use crate::model::Node;
use crate::nav::flatten::{BranchKind, BranchStep};
use crate::nav::keys::{branch_key, node_key};
use std::collections::{BTreeMap, BTreeSet};

/// Which tab is active and which accordion sections are open, keyed by the
/// grouping node's tree key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PanelState {
    tabs: BTreeMap<String, usize>,
    sections: BTreeMap<String, BTreeSet<usize>>,
}

impl PanelState {
    /// Initial state: first tab everywhere, sections open as declared.
    pub fn seeded(nodes: &[Node]) -> Self {
        fn walk(nodes: &[Node], parent: &str, st: &mut PanelState) {
            for (i, node) in nodes.iter().enumerate() {
                let key = node_key(parent, i);
                match node {
                    Node::Field(_) => {}
                    Node::Table(t) => walk(&t.fields, &branch_key(&key, 0), st),
                    Node::Accordion(a) => {
                        let mut open: BTreeSet<usize> = a
                            .sections
                            .iter()
                            .enumerate()
                            .filter(|(_, s)| s.open)
                            .map(|(b, _)| b)
                            .collect();
                        if !a.allow_multiple {
                            open = open.into_iter().take(1).collect();
                        }
                        st.sections.insert(key.clone(), open);
                        for (b, sec) in a.sections.iter().enumerate() {
                            walk(&sec.fields, &branch_key(&key, b), st);
                        }
                    }
                    other => {
                        for (b, branch) in other.branches().into_iter().enumerate() {
                            walk(branch, &branch_key(&key, b), st);
                        }
                    }
                }
            }
        }
        let mut st = PanelState::default();
        walk(nodes, "", &mut st);
        st
    }

    pub fn active_tab(&self, group: &str) -> usize {
        self.tabs.get(group).copied().unwrap_or(0)
    }

    pub fn select_tab(&mut self, group: &str, index: usize) {
        self.tabs.insert(group.to_string(), index);
    }

    pub fn is_open(&self, group: &str, index: usize) -> bool {
        self.sections.get(group).is_some_and(|s| s.contains(&index))
    }

    /// User toggle; single-open accordions close their other sections.
    pub fn toggle_section(&mut self, group: &str, index: usize, allow_multiple: bool) {
        let open = self.sections.entry(group.to_string()).or_default();
        if open.remove(&index) {
            return;
        }
        if !allow_multiple {
            open.clear();
        }
        open.insert(index);
    }

    /// Open a section no matter what is currently open.
    pub fn force_open(&mut self, group: &str, index: usize, allow_multiple: bool) {
        let open = self.sections.entry(group.to_string()).or_default();
        if !allow_multiple {
            open.clear();
        }
        open.insert(index);
    }

    /// Apply a branch chain: switch tabs, open sections.
    pub fn reveal(&mut self, chain: &[BranchStep]) {
        for step in chain {
            match step.kind {
                BranchKind::Tab => self.select_tab(&step.group, step.index),
                BranchKind::Section => self.force_open(&step.group, step.index, step.allow_multiple),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccordionGroup, SectionSpec};

    fn accordion(allow_multiple: bool) -> Vec<Node> {
        vec![Node::Accordion(AccordionGroup {
            sections: vec![
                SectionSpec {
                    title: "A".into(),
                    open: true,
                    ..Default::default()
                },
                SectionSpec {
                    title: "B".into(),
                    open: true,
                    ..Default::default()
                },
            ],
            allow_multiple,
            ..Default::default()
        })]
    }

    #[test]
    fn seeds_declared_open_sections() {
        let single = PanelState::seeded(&accordion(false));
        assert!(single.is_open("0", 0));
        assert!(!single.is_open("0", 1));
        let multi = PanelState::seeded(&accordion(true));
        assert!(multi.is_open("0", 0) && multi.is_open("0", 1));
        assert_eq!(multi.active_tab("anything"), 0);
    }

    #[test]
    fn toggle_and_force_open() {
        let mut st = PanelState::seeded(&accordion(false));
        st.toggle_section("0", 1, false);
        assert!(st.is_open("0", 1) && !st.is_open("0", 0));
        st.toggle_section("0", 1, false);
        assert!(!st.is_open("0", 1));
        st.force_open("0", 0, false);
        st.force_open("0", 0, false);
        assert!(st.is_open("0", 0));
        st.reveal(&[
            BranchStep {
                group: "3".into(),
                kind: BranchKind::Tab,
                index: 2,
                allow_multiple: false,
            },
            BranchStep {
                group: "0".into(),
                kind: BranchKind::Section,
                index: 1,
                allow_multiple: true,
            },
        ]);
        assert_eq!(st.active_tab("3"), 2);
        assert!(st.is_open("0", 0) && st.is_open("0", 1));
    }
}
