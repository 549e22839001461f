//! Sourcemap chain collapsing.
//!
//! Given a generated file, loads its map, then the map of every source that
//! has one, recursively, and rewrites the file's map so that each segment
//! points at the deepest original position.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use path_absolutize::Absolutize;
use regex::Regex;

use super::{Mappings, OriginalPosition, Segment, SourceMap, lookup};
use crate::bundler::error::{Error, ErrorExt, Result};

static SOURCE_MAPPING_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*//[#@]\s*sourceMappingURL=(\S+)\s*$").expect("valid regex")
});

/// A map loaded from disk with its sources resolved to paths.
struct LoadedMap {
    path: PathBuf,
    map: SourceMap,
    lines: Mappings,
    sources: Vec<PathBuf>,
}

impl LoadedMap {
    async fn load(path: PathBuf) -> Result<Self> {
        let json = tokio::fs::read_to_string(&path)
            .await
            .fs_context("reading sourcemap", &path)?;
        let map = SourceMap::from_json(&json).map_err(|e| Error::Sourcemap {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let lines = map.decode().map_err(|reason| Error::Sourcemap {
            path: path.clone(),
            reason,
        })?;

        let mut base = parent_dir(&path);
        if let Some(root) = map.source_root.as_deref().filter(|r| !r.is_empty()) {
            base = base.join(root);
        }
        let sources = map
            .sources
            .iter()
            .map(|source| normalize(&base.join(source)))
            .collect();

        Ok(Self {
            path,
            map,
            lines,
            sources,
        })
    }
}

/// A fully traced original position.
struct Traced<'a> {
    source: &'a Path,
    line: u32,
    column: u32,
    name: Option<&'a str>,
    content: Option<&'a str>,
}

/// Finds the sourcemap of a generated file.
///
/// Looks for a trailing `sourceMappingURL` comment first, then for an adjacent
/// `<file>.map`. Inline `data:` maps are not supported and yield `None`.
pub async fn locate_map(file: &Path) -> Result<Option<PathBuf>> {
    let content = match tokio::fs::read_to_string(file).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        // Binary or unreadable as UTF-8: cannot carry a comment, fall through.
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => String::new(),
        Err(e) => return Err(e).fs_context("reading generated file", file),
    };

    if let Some(url) = SOURCE_MAPPING_URL
        .captures_iter(&content)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    {
        if url.starts_with("data:") {
            log::debug!("Ignoring inline sourcemap of {}", file.display());
            return Ok(None);
        }
        let candidate = normalize(&parent_dir(file).join(url));
        if tokio::fs::try_exists(&candidate)
            .await
            .fs_context("checking sourcemap", &candidate)?
        {
            return Ok(Some(candidate));
        }
    }

    let adjacent = PathBuf::from(format!("{}.map", file.display()));
    if tokio::fs::try_exists(&adjacent)
        .await
        .fs_context("checking sourcemap", &adjacent)?
    {
        return Ok(Some(adjacent));
    }
    Ok(None)
}

/// Collapses the sourcemap chain of `file` in place.
///
/// Returns `false` without touching anything when the file has no map or
/// none of its sources has a map of its own, which also makes collapsing an
/// already collapsed map a no-op.
pub async fn collapse(file: &Path) -> Result<bool> {
    let Some(map_path) = locate_map(file).await? else {
        log::debug!("No sourcemap for {}, skipping", file.display());
        return Ok(false);
    };

    let root = LoadedMap::load(map_path.clone()).await?;

    // Load every map reachable through sources; a path seen twice is not
    // reloaded, which also breaks self-referencing chains.
    let mut chain: HashMap<PathBuf, Option<LoadedMap>> = HashMap::new();
    chain.insert(normalize(file), None);
    let mut pending: Vec<PathBuf> = root.sources.clone();
    while let Some(source) = pending.pop() {
        if chain.contains_key(&source) {
            continue;
        }
        let loaded = match locate_map(&source).await? {
            Some(path) => Some(LoadedMap::load(path).await?),
            None => None,
        };
        if let Some(loaded) = &loaded {
            pending.extend(loaded.sources.iter().cloned());
        }
        chain.insert(source, loaded);
    }

    if chain.values().all(Option::is_none) {
        log::debug!("Sourcemap of {} is already collapsed", file.display());
        return Ok(false);
    }

    let collapsed = rebuild(&root, &chain);
    let json = collapsed.to_json()?;
    tokio::fs::write(&map_path, json)
        .await
        .fs_context("writing collapsed sourcemap", &map_path)?;

    log::debug!(
        "Collapsed sourcemap of {} ({} original sources)",
        file.display(),
        collapsed.sources.len()
    );
    Ok(true)
}

fn rebuild(root: &LoadedMap, chain: &HashMap<PathBuf, Option<LoadedMap>>) -> SourceMap {
    let map_dir = parent_dir(&root.path);
    let mut out = SourceMap::new(root.map.file.clone());
    let mut source_ids: HashMap<&Path, u32> = HashMap::new();
    let mut name_ids: HashMap<&str, u32> = HashMap::new();
    let mut contents: Vec<Option<String>> = Vec::new();
    let max_depth = chain.len() + 1;

    let lines: Vec<Vec<Segment>> = root
        .lines
        .iter()
        .map(|segments| {
            segments
                .iter()
                .map(|segment| {
                    // Untraceable positions keep their column boundary, unmapped.
                    let Some(traced) = segment
                        .original
                        .and_then(|original| trace(root, original, chain, max_depth))
                    else {
                        return Segment {
                            generated_column: segment.generated_column,
                            original: None,
                        };
                    };

                    let source = *source_ids.entry(traced.source).or_insert_with(|| {
                        out.sources.push(relative_to(&map_dir, traced.source));
                        contents.push(traced.content.map(str::to_string));
                        (out.sources.len() - 1) as u32
                    });
                    let name = traced.name.map(|name| {
                        *name_ids.entry(name).or_insert_with(|| {
                            out.names.push(name.to_string());
                            (out.names.len() - 1) as u32
                        })
                    });

                    Segment {
                        generated_column: segment.generated_column,
                        original: Some(OriginalPosition {
                            source,
                            line: traced.line,
                            column: traced.column,
                            name,
                        }),
                    }
                })
                .collect()
        })
        .collect();

    out.set_mappings(&lines);
    if contents.iter().any(Option::is_some) {
        out.sources_content = Some(contents);
    }
    out
}

fn trace<'a>(
    map: &'a LoadedMap,
    position: OriginalPosition,
    chain: &'a HashMap<PathBuf, Option<LoadedMap>>,
    depth: usize,
) -> Option<Traced<'a>> {
    let source = map.sources.get(position.source as usize)?;
    let name = position
        .name
        .and_then(|n| map.map.names.get(n as usize))
        .map(String::as_str);

    match chain.get(source) {
        Some(Some(next)) if depth > 0 => {
            // Unmapped in the next link: the segment has no original.
            let segment = lookup(&next.lines, position.line, position.column)?;
            let original = segment.original?;
            let mut traced = trace(next, original, chain, depth - 1)?;
            if traced.name.is_none() {
                traced.name = name;
            }
            Some(traced)
        }
        _ => Some(Traced {
            source,
            line: position.line,
            column: position.column,
            name,
            content: map.map.source_content(position.source as usize),
        }),
    }
}

/// Shifts generated columns of `file`'s map after inline text insertions.
///
/// Each insertion is `(line, column, width)` in coordinates of the text
/// before insertion. Missing maps are skipped.
pub async fn shift_map_columns(file: &Path, insertions: &[(u32, u32, u32)]) -> Result<()> {
    if insertions.is_empty() {
        return Ok(());
    }
    let Some(map_path) = locate_map(file).await? else {
        return Ok(());
    };

    let json = tokio::fs::read_to_string(&map_path)
        .await
        .fs_context("reading sourcemap", &map_path)?;
    let mut map = SourceMap::from_json(&json).map_err(|e| Error::Sourcemap {
        path: map_path.clone(),
        reason: e.to_string(),
    })?;
    let mut lines = map.decode().map_err(|reason| Error::Sourcemap {
        path: map_path.clone(),
        reason,
    })?;

    for (line, segments) in lines.iter_mut().enumerate() {
        let mut on_line: Vec<(u32, u32)> = insertions
            .iter()
            .filter(|(l, _, _)| *l as usize == line)
            .map(|(_, column, width)| (*column, *width))
            .collect();
        if on_line.is_empty() {
            continue;
        }
        on_line.sort_unstable();
        for segment in segments.iter_mut() {
            let shift: u32 = on_line
                .iter()
                .take_while(|(column, _)| *column <= segment.generated_column)
                .map(|(_, width)| width)
                .sum();
            segment.generated_column += shift;
        }
    }

    map.set_mappings(&lines);
    tokio::fs::write(&map_path, map.to_json()?)
        .await
        .fs_context("writing sourcemap", &map_path)
}

/// Rewrites the sources of a map moved from `from_dir` to `to_dir` so they
/// still point at the same files.
pub fn rebase_sources(map: &mut SourceMap, from_dir: &Path, to_dir: &Path) {
    let mut base = from_dir.to_path_buf();
    if let Some(root) = map.source_root.take().filter(|r| !r.is_empty()) {
        base = base.join(root);
    }
    for source in &mut map.sources {
        *source = relative_to(to_dir, &normalize(&base.join(&*source)));
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Absolute, lexically normalized path.
fn normalize(path: &Path) -> PathBuf {
    path.absolutize()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_path_buf())
}

/// `to` relative to directory `from`, always with `/` separators.
fn relative_to(from: &Path, to: &Path) -> String {
    let from = normalize(from);
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat_n("..".to_string(), from.len() - common).collect();
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
