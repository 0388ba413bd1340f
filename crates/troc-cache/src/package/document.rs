//! Package document (`info.json`) manipulation

use serde_json::{Map, Value};

/// Field of a publish payload holding base64 tarball bodies
pub const ATTACHMENTS_FIELD: &str = "_attachments";

/// Remove and return the `_attachments` object of a publish payload
pub fn strip_attachments(payload: &mut Value) -> Option<Value> {
    payload.as_object_mut()?.remove(ATTACHMENTS_FIELD)
}

/// Recursively merge `source` into `target`. Objects merge key by key;
/// any other value in `source` replaces the one in `target`.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Merge an incoming publish payload into the current package document.
///
/// Versions accumulate: `versions`, `time` and `dist-tags` are merged key by
/// key so an earlier version is never lost. Attachments are never persisted.
pub fn merge_info(current: Option<Value>, mut incoming: Value) -> Value {
    strip_attachments(&mut incoming);

    let mut next = match current {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };
    // A previous document may predate this rule
    strip_attachments(&mut next);

    deep_merge(&mut next, incoming);
    next
}

/// Record the publishing user on each of `versions`
pub fn stamp_npm_user(info: &mut Value, versions: &[&str], name: &str, email: &str) {
    let Some(manifests) = info.get_mut("versions").and_then(Value::as_object_mut) else {
        return;
    };
    for version in versions {
        if let Some(manifest) = manifests.get_mut(*version).and_then(Value::as_object_mut) {
            manifest.insert(
                "_npmUser".to_string(),
                serde_json::json!({ "name": name, "email": email }),
            );
        }
    }
}

/// Record publish times: one entry per version, `modified` always and
/// `created` on the first publish
pub fn stamp_publish_time(info: &mut Value, versions: &[&str], now: &str) {
    let Some(doc) = info.as_object_mut() else {
        return;
    };
    let time = doc
        .entry("time")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(time) = time.as_object_mut() else {
        return;
    };

    for version in versions {
        time.insert(version.to_string(), Value::String(now.to_string()));
    }
    time.entry("created")
        .or_insert_with(|| Value::String(now.to_string()));
    time.insert("modified".to_string(), Value::String(now.to_string()));
}

/// Tarball file name for a version, `<name>-<version>.tgz`
pub fn tarball_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.tgz", name, version)
}

/// Point every version's `dist.tarball` at this gateway.
///
/// `base_url` is the gateway origin plus registry prefix, e.g.
/// `http://localhost:4873/team`.
pub fn rewrite_tarball_urls(info: &mut Value, base_url: &str, scope: Option<&str>, name: &str) {
    let base_url = base_url.trim_end_matches('/');
    let package_path = match scope {
        Some(scope) => format!("{}/{}", scope, name),
        None => name.to_string(),
    };

    let Some(versions) = info.get_mut("versions").and_then(Value::as_object_mut) else {
        return;
    };

    for (version, manifest) in versions.iter_mut() {
        let Some(manifest) = manifest.as_object_mut() else {
            continue;
        };
        let dist = manifest
            .entry("dist")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(dist) = dist.as_object_mut() {
            dist.insert(
                "tarball".to_string(),
                Value::String(format!(
                    "{}/{}/-/{}",
                    base_url,
                    package_path,
                    tarball_file_name(name, version)
                )),
            );
        }
    }
}
