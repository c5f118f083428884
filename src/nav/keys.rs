/// Key of the `idx`-th node under `parent` in the declaration tree.
pub fn node_key(parent: &str, idx: usize) -> String {
    if parent.is_empty() {
        format!("{idx}")
    } else {
        format!("{parent}/{idx}")
    }
}

/// Key of the `branch`-th tab/section of the grouping node `group`.
pub fn branch_key(group: &str, branch: usize) -> String {
    format!("{group}#{branch}")
}

/// Namespace of a table's add-form buffer.
pub fn draft_path(table: &str) -> String {
    format!("{table}.draft")
}

/// Namespace of row `idx` of `table` (`items.3`).
pub fn row_path(table: &str, idx: usize) -> String {
    format!("{table}.{idx}")
}

/// Absolute data path of a nested table inside row `idx` of `parent`.
pub fn child_table_path(parent: &str, idx: usize, relative: &str) -> String {
    format!("{parent}.{idx}.{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compose() {
        let g = node_key("", 2);
        assert_eq!(g, "2");
        let b = branch_key(&g, 1);
        assert_eq!(node_key(&b, 0), "2#1/0");
        assert_eq!(draft_path("items"), "items.draft");
        assert_eq!(row_path("items", 3), "items.3");
        assert_eq!(child_table_path("items", 0, "parts"), "items.0.parts");
    }
}
