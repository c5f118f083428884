use serde_json::{Map, Value as JsonValue};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// Split `a.b[2].c` / `a.b.2.c` into segments. Empty segments are dropped.
pub fn segments(path: &str) -> Vec<Segment> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(i) if s.chars().all(|c| c.is_ascii_digit()) => Segment::Index(i),
            _ => Segment::Key(s.to_string()),
        })
        .collect()
}

pub fn get_by_path<'a>(v: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let segs = segments(path);
    if segs.is_empty() {
        return None;
    }
    let mut cur = v;
    for seg in &segs {
        cur = match (cur, seg) {
            (JsonValue::Array(arr), Segment::Index(i)) => arr.get(*i)?,
            (JsonValue::Object(map), seg) => map.get(&seg.as_key())?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Return a copy of `v` with `value` written at `path`; `v` is left untouched.
pub fn set_by_path(v: &JsonValue, path: &str, value: JsonValue) -> JsonValue {
    let mut out = v.clone();
    write_path(&mut out, path, value);
    out
}

/// Largest run of `null`s a write may pad an array with.
pub const MAX_INDEX_GAP: usize = 1024;

/// True when some index segment lies more than [`MAX_INDEX_GAP`] past the
/// end of the array it would land in.
fn index_gap_too_wide(v: &JsonValue, segs: &[Segment]) -> bool {
    let mut cur = Some(v);
    for seg in segs {
        if let Segment::Index(idx) = seg {
            let in_object = cur.is_some_and(JsonValue::is_object);
            let len = cur.and_then(JsonValue::as_array).map_or(0, Vec::len);
            if !in_object && *idx > len.saturating_add(MAX_INDEX_GAP) {
                return true;
            }
        }
        cur = cur.and_then(|c| match (c, seg) {
            (JsonValue::Array(arr), Segment::Index(i)) => arr.get(*i),
            (JsonValue::Object(map), seg) => map.get(&seg.as_key()),
            _ => None,
        });
    }
    false
}

/// In-place variant of [`set_by_path`]. Missing containers are created: an
/// array when the next segment is numeric, an object otherwise. Returns
/// `false`, leaving `v` untouched, when an index is too far past the end of
/// its array.
pub fn write_path(v: &mut JsonValue, path: &str, value: JsonValue) -> bool {
    let segs = segments(path);
    if segs.is_empty() {
        *v = value;
        return true;
    }
    if index_gap_too_wide(v, &segs) {
        return false;
    }
    let mut cur = v;
    for (i, seg) in segs.iter().enumerate() {
        let last = i + 1 == segs.len();
        let next_is_index = matches!(segs.get(i + 1), Some(Segment::Index(_)));
        cur = match seg {
            Segment::Index(idx) if !cur.is_object() => {
                if !cur.is_array() {
                    *cur = JsonValue::Array(Vec::new());
                }
                let JsonValue::Array(arr) = cur else {
                    return false;
                };
                while arr.len() <= *idx {
                    arr.push(JsonValue::Null);
                }
                &mut arr[*idx]
            }
            seg => {
                if !cur.is_object() {
                    *cur = JsonValue::Object(Map::new());
                }
                let JsonValue::Object(map) = cur else {
                    return false;
                };
                map.entry(seg.as_key()).or_insert(JsonValue::Null)
            }
        };
        if last {
            *cur = value;
            return true;
        }
        if cur.is_null() {
            *cur = if next_is_index {
                JsonValue::Array(Vec::new())
            } else {
                JsonValue::Object(Map::new())
            };
        }
    }
    true
}

/// Remove the value at `path`, returning it. Array elements are spliced out.
pub fn remove_path(v: &mut JsonValue, path: &str) -> Option<JsonValue> {
    let mut segs = segments(path);
    let leaf = segs.pop()?;
    let mut cur = v;
    for seg in &segs {
        cur = match (cur, seg) {
            (JsonValue::Array(arr), Segment::Index(i)) => arr.get_mut(*i)?,
            (JsonValue::Object(map), seg) => map.get_mut(&seg.as_key())?,
            _ => return None,
        };
    }
    match (cur, &leaf) {
        (JsonValue::Array(arr), Segment::Index(i)) if *i < arr.len() => Some(arr.remove(*i)),
        (JsonValue::Object(map), seg) => map.remove(&seg.as_key()),
        _ => None,
    }
}

pub fn join(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}.{child}"),
    }
}

/// True when `path` is `prefix` itself or lies underneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// Canonical dotted form (`a[0].b` -> `a.0.b`).
pub fn normalize(path: &str) -> String {
    segments(path)
        .iter()
        .map(Segment::as_key)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn segments_accept_brackets_and_dots() {
        assert_eq!(
            segments("items[2].name"),
            vec![
                Segment::Key("items".into()),
                Segment::Index(2),
                Segment::Key("name".into())
            ]
        );
        assert_eq!(segments("items.2.name"), segments("items[2].name"));
        assert!(segments("").is_empty());
    }

    #[test]
    fn get_by_path_walks_objects_and_arrays() {
        let v = json!({"data": {"items": [{"id": "a"}, {"id": "b"}], "meta": {"page": 1}}});
        assert_eq!(get_by_path(&v, "data.items.1.id"), Some(&json!("b")));
        assert_eq!(get_by_path(&v, "data.items[0].id"), Some(&json!("a")));
        assert_eq!(get_by_path(&v, "data.meta.page"), Some(&json!(1)));
        assert!(get_by_path(&v, "data.missing").is_none());
        assert!(get_by_path(&v, "data.items.9").is_none());
        assert!(get_by_path(&v, "").is_none());
    }

    #[test]
    fn set_by_path_leaves_original_untouched() {
        let v = json!({"a": {"b": 1}});
        let out = set_by_path(&v, "a.c", json!(2));
        assert_eq!(v, json!({"a": {"b": 1}}));
        assert_eq!(out, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn write_path_creates_arrays_for_numeric_segments() {
        let mut v = json!({});
        write_path(&mut v, "items.1.name", json!("x"));
        assert_eq!(v, json!({"items": [null, {"name": "x"}]}));
        // numeric segment against an existing object is treated as a key
        let mut o = json!({"m": {"0": "zero"}});
        write_path(&mut o, "m.0", json!("changed"));
        assert_eq!(o, json!({"m": {"0": "changed"}}));
    }

    #[test]
    fn write_path_refuses_runaway_indices() {
        let mut v = json!({"tags": ["a"]});
        assert!(!write_path(&mut v, "tags.4000000000", json!("x")));
        assert!(!write_path(&mut v, "fresh.5000.name", json!("x")));
        assert_eq!(v, json!({"tags": ["a"]}));
        assert!(write_path(&mut v, "tags.3", json!("d")));
        assert_eq!(v, json!({"tags": ["a", null, null, "d"]}));
        // keys of an existing object are not indices
        let mut o = json!({"m": {}});
        assert!(write_path(&mut o, "m.4000000000", json!(1)));
        assert_eq!(o, json!({"m": {"4000000000": 1}}));
    }

    #[test]
    fn remove_path_splices_arrays() {
        let mut v = json!({"items": [1, 2, 3], "k": {"x": 1}});
        assert_eq!(remove_path(&mut v, "items.1"), Some(json!(2)));
        assert_eq!(remove_path(&mut v, "k.x"), Some(json!(1)));
        assert_eq!(v, json!({"items": [1, 3], "k": {}}));
        assert!(remove_path(&mut v, "nope.deep").is_none());
    }

    #[test]
    fn is_within_respects_segment_boundaries() {
        assert!(is_within("items.0.name", "items"));
        assert!(is_within("items", "items"));
        assert!(!is_within("items_extra", "items"));
        assert!(!is_within("item", "items"));
        assert_eq!(normalize("a[0].b"), "a.0.b");
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a", "x"), "a.x");
    }
}
