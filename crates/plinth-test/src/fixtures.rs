//! Registry catalog and plugin manifest fixtures.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::archive::ZipFixture;

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A catalog version entry.
///
/// `arch` pairs a platform key (`linux-amd64`, `any`, ...) with an optional
/// checksum. An empty slice produces a version with no `arch` map.
#[must_use]
pub fn version_json(version: &str, arch: &[(&str, Option<&str>)]) -> Value {
    let mut entry = json!({
        "version": version,
        "commit": "0123abcd",
        "url": "https://github.com/example/plugin",
    });
    if !arch.is_empty() {
        let map: Map<String, Value> = arch
            .iter()
            .map(|(key, checksum)| {
                let info = checksum.map_or_else(|| json!({}), |sum| json!({ "sha256": sum }));
                ((*key).to_owned(), info)
            })
            .collect();
        entry["arch"] = Value::Object(map);
    }
    entry
}

/// A catalog response for `plugin_id`. `versions` should be newest first.
#[must_use]
pub fn catalog_json(plugin_id: &str, versions: Vec<Value>) -> Value {
    json!({ "id": plugin_id, "versions": versions })
}

/// A `plugin.json` body declaring `dependencies` as `(id, version)` pairs.
#[must_use]
pub fn manifest_json(plugin_id: &str, version: &str, dependencies: &[(&str, &str)]) -> String {
    let plugins: Vec<Value> = dependencies
        .iter()
        .map(|(id, version)| json!({ "id": id, "version": version, "type": "panel" }))
        .collect();
    json!({
        "id": plugin_id,
        "name": plugin_id,
        "type": "panel",
        "info": { "version": version },
        "dependencies": { "hostDependency": ">=1.0.0", "plugins": plugins },
    })
    .to_string()
}

/// A plugin archive laid out like a source snapshot: a commit-ish root
/// directory holding `plugin.json` and `module.js`.
#[must_use]
pub fn plugin_archive(plugin_id: &str, version: &str, dependencies: &[(&str, &str)]) -> Vec<u8> {
    let root = format!("{plugin_id}-0123abcd");
    ZipFixture::new()
        .dir(&format!("{root}/"))
        .file(
            &format!("{root}/plugin.json"),
            manifest_json(plugin_id, version, dependencies),
        )
        .file(&format!("{root}/module.js"), "export const plugin = {};")
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_without_arch_has_no_arch_key() {
        let v = version_json("1.0.0", &[]);
        assert!(v.get("arch").is_none());
    }

    #[test]
    fn version_with_checksums() {
        let v = version_json("1.0.0", &[("linux-amd64", Some("aa")), ("any", None)]);
        assert_eq!(v["arch"]["linux-amd64"]["sha256"], "aa");
        assert!(v["arch"]["any"].as_object().unwrap().is_empty());
    }

    #[test]
    fn manifest_lists_dependencies_in_order() {
        let body = manifest_json("app", "2.0.0", &[("b", "1.0.0"), ("a", "")]);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["dependencies"]["plugins"][0]["id"], "b");
        assert_eq!(value["dependencies"]["plugins"][1]["id"], "a");
        assert_eq!(value["info"]["version"], "2.0.0");
    }
}
