use std::collections::BTreeMap;

/// Where a mounted control sits in the rendered surface, in content lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlHandle {
    pub line: u16,
    pub height: u16,
}

impl ControlHandle {
    pub fn center(&self) -> u16 {
        self.line + self.height / 2
    }
}

/// Last mounted control per path, maintained by the rendering layer.
#[derive(Clone, Debug, Default)]
pub struct ControlRegistry {
    handles: BTreeMap<String, ControlHandle>,
}

impl ControlRegistry {
    pub fn mount(&mut self, path: impl Into<String>, handle: ControlHandle) {
        self.handles.insert(path.into(), handle);
    }

    pub fn get(&self, path: &str) -> Option<ControlHandle> {
        self.handles.get(path).copied()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remount_replaces_handle() {
        let mut reg = ControlRegistry::default();
        assert!(reg.is_empty());
        reg.mount("email", ControlHandle { line: 4, height: 3 });
        reg.mount("name", ControlHandle { line: 1, height: 3 });
        reg.mount("email", ControlHandle { line: 7, height: 3 });
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("email").map(|h| h.center()), Some(8));
        reg.clear();
        assert!(reg.is_empty());
    }
}
