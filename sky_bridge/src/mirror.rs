use serde_json::{Map, Value};
use sky_proto::{ChangeIds, TimeSection, ACTION_CHANGES, CHANGES, ID, PROPERTY_CHANGES, TIME};

use crate::error::SyncError;

/// Sentinel returned for properties the mirror does not know.
pub const UNKNOWN_PROPERTY: &str = "null";

/// Client-held copy of the remote state tree plus the change-set ids it reflects.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMirror {
    tree: Map<String, Value>,
    ids: ChangeIds,
}

/// What a successful delta application did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaSummary {
    pub ids: ChangeIds,
    pub sections: usize,
}

impl RemoteMirror {
    /// Build a mirror from a full-state status response.
    pub fn from_full_state(body: &str) -> Result<Self, SyncError> {
        let tree = parse_status(body)?;
        let action = section_id(&tree, ACTION_CHANGES).ok_or_else(|| {
            SyncError::MalformedDelta(format!("full state lacks `{ACTION_CHANGES}.{ID}`"))
        })?;
        let property = section_id(&tree, PROPERTY_CHANGES).ok_or_else(|| {
            SyncError::MalformedDelta(format!("full state lacks `{PROPERTY_CHANGES}.{ID}`"))
        })?;
        Ok(Self {
            tree,
            ids: ChangeIds::new(action, property),
        })
    }

    pub fn ids(&self) -> ChangeIds {
        self.ids
    }

    pub fn tree(&self) -> &Map<String, Value> {
        &self.tree
    }

    /// Merge a delta response body into the mirror.
    ///
    /// The mirror is left untouched when the body is malformed or older than the
    /// ids already applied.
    pub fn apply_delta(&mut self, body: &str) -> Result<DeltaSummary, SyncError> {
        let delta = parse_status(body)?;
        self.apply_delta_tree(delta)
    }

    pub fn apply_delta_tree(&mut self, delta: Map<String, Value>) -> Result<DeltaSummary, SyncError> {
        let received = ChangeIds::new(
            section_id(&delta, ACTION_CHANGES).unwrap_or(self.ids.action),
            section_id(&delta, PROPERTY_CHANGES).unwrap_or(self.ids.property),
        );
        if received.action < self.ids.action || received.property < self.ids.property {
            return Err(SyncError::StaleDelta {
                received,
                current: self.ids,
            });
        }

        let sections = delta.len();
        for (key, value) in delta {
            match self.tree.get_mut(&key) {
                Some(existing) => merge_json(existing, value),
                None => {
                    self.tree.insert(key, value);
                }
            }
        }

        if let Some(action) = section_id(&self.tree, ACTION_CHANGES) {
            self.ids.action = action;
        }
        if let Some(property) = section_id(&self.tree, PROPERTY_CHANGES) {
            self.ids.property = property;
        }

        Ok(DeltaSummary {
            ids: self.ids,
            sections,
        })
    }

    pub fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.tree.get(name).and_then(Value::as_object)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.section(PROPERTY_CHANGES)
            .and_then(|section| section.get(CHANGES))
            .and_then(|changes| changes.get(name))
    }

    /// Cached property rendered as text, or [`UNKNOWN_PROPERTY`].
    pub fn property_string(&self, name: &str) -> String {
        match self.property(name) {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => UNKNOWN_PROPERTY.to_string(),
        }
    }

    pub fn action(&self, name: &str) -> Option<&Value> {
        self.section(ACTION_CHANGES)
            .and_then(|section| section.get(CHANGES))
            .and_then(|changes| changes.get(name))
    }

    pub fn time(&self) -> Option<TimeSection> {
        let value = self.tree.get(TIME)?;
        sky_proto::decode_time_section(value).ok()
    }
}

/// Recursive object merge: objects merge key-wise, anything else replaces.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Parse a status response into its top-level map, rejecting structurally invalid bodies.
pub fn parse_status(body: &str) -> Result<Map<String, Value>, SyncError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| SyncError::MalformedDelta(format!("unparseable status: {err}")))?;
    let Value::Object(tree) = value else {
        return Err(SyncError::MalformedDelta("status is not an object".into()));
    };
    if tree.is_empty() {
        return Err(SyncError::MalformedDelta("empty status".into()));
    }
    for name in sky_proto::STATUS_SECTIONS {
        if let Some(section) = tree.get(name) {
            if !section.is_object() {
                return Err(SyncError::MalformedDelta(format!(
                    "section `{name}` is not an object"
                )));
            }
        }
    }
    Ok(tree)
}

fn section_id(tree: &Map<String, Value>, section: &str) -> Option<i64> {
    tree.get(section)?.get(ID)?.as_i64()
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const FULL_STATE: &str = r#"{
        "actionChanges": {"id": 10, "changes": {"actionShow_Ground": true, "actionShow_Atmosphere": true}},
        "propertyChanges": {"id": 20, "changes": {"SolarSystem.flagMoonScale": false, "StelSkyDrawer.bortleScaleIndex": 3, "StelCore.currentProjectionTypeKey": "ProjectionPerspective"}},
        "time": {"jday": 2460000.5, "utc": "2023-02-24T00:00:00Z", "local": "2023-02-24T01:00:00", "isTimeNow": false, "timerate": 0.0}
    }"#;

    /// Delta answering the ids of [`FULL_STATE`] when nothing changed remotely.
    pub const ECHO_DELTA: &str = r#"{"actionChanges": {"id": 10, "changes": {}}, "propertyChanges": {"id": 20, "changes": {}}}"#;
}

#[cfg(test)]
mod tests {
    use super::fixtures::FULL_STATE;
    use super::*;
    use serde_json::json;

    fn mirror() -> RemoteMirror {
        RemoteMirror::from_full_state(FULL_STATE).expect("full state parses")
    }

    fn delta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("delta object")
    }

    #[test]
    fn full_state_extracts_ids() {
        let mirror = mirror();
        assert_eq!(mirror.ids(), ChangeIds::new(10, 20));
        assert_eq!(mirror.time().map(|t| t.jday), Some(2460000.5));
    }

    #[test]
    fn full_state_without_ids_is_malformed() {
        let err = RemoteMirror::from_full_state(r#"{"time": {"jday": 1.0}}"#).unwrap_err();
        assert!(matches!(err, SyncError::MalformedDelta(_)));
    }

    #[test]
    fn delta_overwrites_present_keys_only() {
        let mut mirror = mirror();
        let summary = mirror
            .apply_delta(r#"{"propertyChanges": {"id": 21, "changes": {"SolarSystem.flagMoonScale": true}}}"#)
            .expect("delta applies");
        assert_eq!(summary.ids, ChangeIds::new(10, 21));
        assert_eq!(mirror.property_string("SolarSystem.flagMoonScale"), "true");
        assert_eq!(mirror.property_string("StelSkyDrawer.bortleScaleIndex"), "3");
        assert_eq!(
            mirror.property_string("StelCore.currentProjectionTypeKey"),
            "ProjectionPerspective"
        );
        assert_eq!(mirror.action("actionShow_Ground"), Some(&json!(true)));
    }

    #[test]
    fn stale_delta_leaves_mirror_untouched() {
        let mut mirror = mirror();
        let before = mirror.clone();
        let err = mirror
            .apply_delta(r#"{"actionChanges": {"id": 9, "changes": {"actionShow_Ground": false}}}"#)
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleDelta { .. }));
        assert_eq!(mirror, before);
    }

    #[test]
    fn malformed_delta_is_rejected() {
        let mut mirror = mirror();
        let before = mirror.clone();
        for body in ["", "{}", "[1,2]", r#"{"time": 5}"#, "not json"] {
            let err = mirror.apply_delta(body).unwrap_err();
            assert!(matches!(err, SyncError::MalformedDelta(_)), "{body:?}");
        }
        assert_eq!(mirror, before);
    }

    #[test]
    fn echo_delta_changes_nothing() {
        let mut mirror = mirror();
        let before = mirror.clone();
        mirror
            .apply_delta(
                r#"{"actionChanges": {"id": 10, "changes": {}},
                    "propertyChanges": {"id": 20, "changes": {}},
                    "time": {"jday": 2460000.5}}"#,
            )
            .expect("echo delta applies");
        assert_eq!(mirror, before);
    }

    #[test]
    fn sequential_deltas_match_merged_delta() {
        let d1 = delta(json!({
            "actionChanges": {"id": 11, "changes": {"actionShow_Ground": false}},
            "time": {"jday": 2460000.6}
        }));
        let d2 = delta(json!({
            "propertyChanges": {"id": 22, "changes": {"SolarSystem.flagMoonScale": true}},
            "time": {"timerate": 1.0}
        }));

        let mut sequential = mirror();
        sequential.apply_delta_tree(d1.clone()).expect("d1");
        sequential.apply_delta_tree(d2.clone()).expect("d2");

        let mut combined = Value::Object(d1);
        merge_json(&mut combined, Value::Object(d2));
        let mut merged = mirror();
        merged
            .apply_delta_tree(combined.as_object().cloned().expect("object"))
            .expect("merged");

        assert_eq!(sequential, merged);
        assert_eq!(sequential.ids(), ChangeIds::new(11, 22));
        let time = sequential.time().expect("time");
        assert_eq!(time.jday, 2460000.6);
        assert_eq!(time.timerate, 1.0);
    }

    #[test]
    fn unknown_property_reads_sentinel() {
        assert_eq!(mirror().property_string("Nope.flag"), UNKNOWN_PROPERTY);
    }
}
