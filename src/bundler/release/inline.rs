//! Inlining of component templates and styles into compiler metadata.
//!
//! Component metadata references resources by bare file name
//! (`templateUrl: './button.html'`). The [`ResourceMap`] resolves those names
//! against every `.html` and `.css` file of the built package tree.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::bundler::error::{Error, ErrorExt, Result};
use crate::bundler::utils::fs::walk_files;

const TEMPLATE_URL: &str = "templateUrl";
const STYLE_URLS: &str = "styleUrls";

/// Bare file name → every file carrying that name.
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl ResourceMap {
    /// Scans `dir` recursively for `.html` and `.css` files.
    pub async fn scan(dir: &Path) -> Result<Self> {
        let resources = walk_files(dir, |path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("html") | Some("css")
            )
        })
        .await?;

        let mut map = Self::default();
        for path in resources {
            map.insert(path);
        }
        log::debug!("Found {} component resources in {}", map.files.len(), dir.display());
        Ok(map)
    }

    /// Registers a resource file.
    pub fn insert(&mut self, path: PathBuf) {
        if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
            self.files.entry(name).or_default().push(path);
        }
    }

    /// Resolves a reference as written in metadata.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousResource`] when several files share the name, and
    /// [`Error::MissingResource`] when none has it.
    pub fn resolve(&self, reference: &str, metadata: &Path) -> Result<&Path> {
        let file_name = bare_name(reference);
        match self.files.get(file_name).map(Vec::as_slice) {
            Some([single]) => Ok(single.as_path()),
            Some(candidates) if !candidates.is_empty() => Err(Error::AmbiguousResource {
                file_name: file_name.to_string(),
                candidates: candidates.to_vec(),
            }),
            _ => Err(Error::MissingResource {
                file_name: file_name.to_string(),
                metadata: metadata.to_path_buf(),
            }),
        }
    }
}

fn bare_name(reference: &str) -> &str {
    reference.rsplit(['/', '\\']).next().unwrap_or(reference)
}

/// Collects every resource reference of a metadata document, in order.
pub fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            let template = object.get(TEMPLATE_URL);
            let styles = object.get(STYLE_URLS);
            if template.is_none() && styles.is_none() {
                object.values().for_each(|v| collect_references(v, out));
                return;
            }
            if let Some(Value::String(url)) = template {
                out.push(url.clone());
            }
            if let Some(Value::Array(urls)) = styles {
                out.extend(urls.iter().filter_map(|u| u.as_str().map(str::to_string)));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

/// Replaces `templateUrl` with `template` and `styleUrls` with `styles`,
/// taking contents from `contents` (keyed by reference). Objects that carried
/// either key are not descended into.
pub fn inline_resources(value: &mut Value, contents: &HashMap<String, String>) {
    match value {
        Value::Object(object) => {
            let template = object.shift_remove(TEMPLATE_URL);
            let styles = object.shift_remove(STYLE_URLS);
            if template.is_none() && styles.is_none() {
                object
                    .values_mut()
                    .for_each(|v| inline_resources(v, contents));
                return;
            }

            if let Some(Value::String(url)) = template {
                let content = contents.get(&url).cloned().unwrap_or_default();
                object.insert("template".into(), Value::String(content));
            }
            if let Some(Value::Array(urls)) = styles {
                let styles = urls
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|url| Value::String(contents.get(url).cloned().unwrap_or_default()))
                    .collect();
                object.insert("styles".into(), Value::Array(styles));
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| inline_resources(v, contents)),
        _ => {}
    }
}

/// Inlines resources into every `*.metadata.json` under `package_dir`,
/// rewriting each file in place. Returns the number of rewritten files.
pub async fn inline_package_metadata(package_dir: &Path) -> Result<usize> {
    let resources = ResourceMap::scan(package_dir).await?;
    let metadata_files = walk_files(package_dir, |path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".metadata.json"))
    })
    .await?;

    let mut rewritten = 0;
    for path in metadata_files {
        let json = tokio::fs::read_to_string(&path)
            .await
            .fs_context("reading metadata", &path)?;
        let mut metadata: Value = serde_json::from_str(&json)?;

        let mut references = Vec::new();
        collect_references(&metadata, &mut references);
        if references.is_empty() {
            continue;
        }

        let mut contents = HashMap::new();
        for reference in references {
            if contents.contains_key(&reference) {
                continue;
            }
            let resource = resources.resolve(&reference, &path)?;
            let content = tokio::fs::read_to_string(resource)
                .await
                .fs_context("reading component resource", resource)?;
            contents.insert(reference, content);
        }

        inline_resources(&mut metadata, &contents);
        tokio::fs::write(&path, serde_json::to_string(&metadata)?)
            .await
            .fs_context("writing metadata", &path)?;
        rewritten += 1;
    }

    log::debug!("Inlined resources into {rewritten} metadata files");
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn inlines_and_stops_descending() {
        let mut metadata = json!({
            "MdButton": {
                "decorators": [{
                    "arguments": [{
                        "templateUrl": "./button.html",
                        "styleUrls": ["button.css", "theme.css"],
                        "nested": {"templateUrl": "ignored.html"}
                    }]
                }]
            }
        });
        let mut references = Vec::new();
        collect_references(&metadata, &mut references);
        assert_eq!(references, vec!["./button.html", "button.css", "theme.css"]);

        let contents = HashMap::from([
            ("./button.html".to_string(), "<button></button>".to_string()),
            ("button.css".to_string(), "a{}".to_string()),
            ("theme.css".to_string(), "b{}".to_string()),
        ]);
        inline_resources(&mut metadata, &contents);

        let args = &metadata["MdButton"]["decorators"][0]["arguments"][0];
        assert_eq!(args["template"], "<button></button>");
        assert_eq!(args["styles"], json!(["a{}", "b{}"]));
        assert!(args.get("templateUrl").is_none());
        assert!(args.get("styleUrls").is_none());
        assert_eq!(args["nested"]["templateUrl"], "ignored.html");
    }

    #[test]
    fn resolution_distinguishes_missing_and_ambiguous() {
        let mut map = ResourceMap::default();
        map.insert(PathBuf::from("/pkg/a/icon.html"));
        map.insert(PathBuf::from("/pkg/b/icon.html"));
        map.insert(PathBuf::from("/pkg/b/list.html"));
        let metadata = Path::new("/pkg/b/b.metadata.json");

        assert_eq!(map.resolve("./list.html", metadata).unwrap(), Path::new("/pkg/b/list.html"));
        let err = map.resolve("icon.html", metadata).unwrap_err();
        assert!(matches!(err, Error::AmbiguousResource { ref candidates, .. } if candidates.len() == 2));
        let err = map.resolve("nope.css", metadata).unwrap_err();
        assert!(matches!(err, Error::MissingResource { .. }));
    }

    #[tokio::test]
    async fn rewrites_metadata_files_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("button");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("button.html"), "<ng-content></ng-content>").unwrap();
        std::fs::write(
            dir.join("button.metadata.json"),
            r#"{"args":{"templateUrl":"button.html"}}"#,
        )
        .unwrap();
        std::fs::write(dir.join("plain.metadata.json"), r#"{"x":1}"#).unwrap();

        assert_eq!(inline_package_metadata(tmp.path()).await.unwrap(), 1);
        let written = std::fs::read_to_string(dir.join("button.metadata.json")).unwrap();
        assert_eq!(written, r#"{"args":{"template":"<ng-content></ng-content>"}}"#);
    }
}
