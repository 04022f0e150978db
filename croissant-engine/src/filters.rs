//! Record filters pushed down to file selection
//!
//! A filter `{field: value}` applies to a field derived from the `filename` or
//! `fullpath` of a FileSet through a single regex transform with one capturing
//! group. The group is replaced by the escaped value and the resulting regex is
//! turned into a glob, so only files yielding that value are read.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::info;

use croissant_core::{FileProperty, NodeId, StructureGraph};

use crate::error::{Error, Result};
use crate::operation::OperationKind;
use crate::plan::OperationGraph;

/// Expand every optional non-capturing group `(?:x)?` into both alternatives
fn expand_optional_groups(regex: &str) -> Vec<String> {
    let Some(open) = regex.find("(?:") else {
        return vec![regex.to_string()];
    };
    let mut depth = 0usize;
    let mut close = None;
    let bytes = regex.as_bytes();
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
        i += 1;
    }
    let Some(close) = close.filter(|c| bytes.get(c + 1) == Some(&b'?')) else {
        return vec![regex.to_string()];
    };
    let before = &regex[..open];
    let inner = &regex[open + 3..close];
    let after = &regex[close + 2..];
    let mut out = Vec::new();
    for rest in expand_optional_groups(after) {
        for middle in expand_optional_groups(inner) {
            out.push(format!("{before}{middle}{rest}"));
        }
        out.push(format!("{before}{rest}"));
    }
    out
}

/// Translate a regex made of literals, `.*`, `.+` and simple classes into globs
pub fn regex_to_glob(regex: &str) -> Vec<String> {
    expand_optional_groups(regex)
        .into_iter()
        .map(|regex| {
            let regex = regex.strip_prefix('^').unwrap_or(&regex);
            let regex = regex.strip_suffix('$').unwrap_or(regex);
            let chars: Vec<char> = regex.chars().collect();
            let mut glob = String::with_capacity(chars.len());
            let mut i = 0;
            while i < chars.len() {
                let repeated = matches!(chars.get(i + 1), Some('*' | '+'));
                match chars[i] {
                    '\\' if i + 1 < chars.len() => {
                        let escaped = chars[i + 1];
                        let class_repeated = matches!(chars.get(i + 2), Some('*' | '+'));
                        match escaped {
                            'd' | 'w' | 'S' if class_repeated => {
                                glob.push('*');
                                i += 1;
                            }
                            'd' => glob.push_str("[0-9]"),
                            'w' | 'S' => glob.push('?'),
                            other => glob.push(other),
                        }
                        i += 1;
                    }
                    '.' if repeated => {
                        glob.push('*');
                        i += 1;
                    }
                    '.' => glob.push('?'),
                    other => glob.push(other),
                }
                i += 1;
            }
            glob
        })
        .collect()
}

/// Span of the only capturing group of `regex`, parentheses included
fn capturing_group(regex: &str) -> Result<(usize, usize)> {
    let bytes = regex.as_bytes();
    let mut groups = Vec::new();
    let mut stack: Vec<(usize, bool)> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'(' => stack.push((i, bytes.get(i + 1) != Some(&b'?'))),
            b')' => {
                if let Some((start, true)) = stack.pop() {
                    groups.push((start, i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    match groups.as_slice() {
        [group] => Ok(*group),
        _ => Err(Error::Filter(format!(
            "regex {regex} should have exactly one capturing group, found {}",
            groups.len()
        ))),
    }
}

/// Replace the only capturing group of `regex` by the literal `value`
pub fn capture_one_capturing_group(regex: &str, value: &str) -> Result<String> {
    let (start, end) = capturing_group(regex)?;
    let group = &regex[start + 1..end - 1];
    let check = Regex::new(&format!("^(?:{group})$"))
        .map_err(|e| Error::Filter(format!("invalid regex {regex}: {e}")))?;
    if !check.is_match(value) {
        return Err(Error::Filter(format!(
            "value \"{value}\" does not match the group ({group}) of {regex}"
        )));
    }
    Ok(format!("{}{}{}", &regex[..start], regex::escape(value), &regex[end..]))
}

fn find_field(graph: &StructureGraph, record_set: NodeId, key: &str) -> Option<NodeId> {
    let node = graph.record_set(record_set)?;
    graph.all_fields(node).into_iter().find(|id| {
        let info = graph.node(*id).info();
        info.uid == key || info.name == key
    })
}

/// Copy of `plan` where the files feeding `record_set` are restricted by `filters`
pub fn apply_filters(
    graph: &StructureGraph,
    plan: &OperationGraph,
    record_set: NodeId,
    filters: &BTreeMap<String, String>,
) -> Result<OperationGraph> {
    if filters.len() > 1 {
        return Err(Error::Filter(format!(
            "only one filter is supported at a time, got {}",
            filters.len()
        )));
    }
    let mut plan = plan.clone();
    for (key, value) in filters {
        let field = find_field(graph, record_set, key)
            .and_then(|id| graph.field(id))
            .ok_or_else(|| Error::Filter(format!("no field named \"{key}\" in {}", graph.node(record_set).uid())))?;
        let source = field
            .source
            .as_ref()
            .ok_or_else(|| Error::Filter(format!("field \"{key}\" has no source")))?;
        let file_set = field
            .source_node()
            .filter(|id| graph.file_set(*id).is_some())
            .ok_or_else(|| Error::Filter(format!("field \"{key}\" is not read from a FileSet")))?;
        let property = source
            .extract
            .file_property
            .filter(|p| matches!(p, FileProperty::Filename | FileProperty::Fullpath))
            .ok_or_else(|| {
                Error::Filter(format!(
                    "field \"{key}\" must extract the filename or the fullpath of its files"
                ))
            })?;
        let regex = match source.transforms.as_slice() {
            [transform] => transform.regex.as_deref(),
            _ => None,
        }
        .ok_or_else(|| Error::Filter(format!("field \"{key}\" must have a single regex transform")))?;
        let globs = regex_to_glob(&capture_one_capturing_group(regex, value)?);

        let targets: Vec<_> = plan
            .operations()
            .filter(|(_, op)| op.node == file_set && matches!(op.kind, OperationKind::FilterFiles { .. }))
            .map(|(id, _)| id)
            .collect();
        for id in targets {
            let OperationKind::FilterFiles { includes, .. } = &mut plan.operation_mut(id).kind else {
                continue;
            };
            *includes = match property {
                FileProperty::Fullpath => globs.clone(),
                _ => includes
                    .iter()
                    .flat_map(|include| match include.rfind('/') {
                        Some(at) => globs
                            .iter()
                            .map(|glob| format!("{}{glob}", &include[..=at]))
                            .collect::<Vec<_>>(),
                        None => globs
                            .iter()
                            .flat_map(|glob| [glob.clone(), format!("*/{glob}")])
                            .collect(),
                    })
                    .collect(),
            };
            info!(field = %key, value = %value, includes = ?includes, "filtered files");
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(r"^(train|test)/.*\.jpg$", &["(train|test)/*.jpg"])]
    #[test_case(r"^.*/split-\d+\.parquet$", &["*/split-*.parquet"])]
    #[test_case(r"^data(?:/extra)?/a\.csv$", &["data/extra/a.csv", "data/a.csv"])]
    #[test_case(r"^img_.+\.png$", &["img_*.png"])]
    fn test_regex_to_glob(regex: &str, expected: &[&str]) {
        assert_eq!(regex_to_glob(regex), expected);
    }

    #[test]
    fn test_capture_one_capturing_group() {
        let regex = r"^(?:data/)?(train|test)/.*\.jpg$";
        assert_eq!(
            capture_one_capturing_group(regex, "train").unwrap(),
            r"^(?:data/)?train/.*\.jpg$"
        );
        assert!(capture_one_capturing_group(regex, "validation").is_err());
        assert!(capture_one_capturing_group(r"^(a)(b)$", "a").is_err());
    }

    #[test]
    fn test_filter_to_glob() {
        let regex = capture_one_capturing_group(r"^(?:data/)?(train|test)/.*\.jpg$", "test").unwrap();
        assert_eq!(regex_to_glob(&regex), vec!["data/test/*.jpg", "test/*.jpg"]);
    }

    proptest! {
        #[test]
        fn test_captured_value_matches_itself(value in "[a-z0-9_]{1,12}") {
            let regex = capture_one_capturing_group(r"^split-(\w+)\.csv$", &value).unwrap();
            let check = Regex::new(&regex).unwrap();
            let matching = format!("split-{}.csv", value);
            let longer = format!("split-{}x.csv", value);
            prop_assert!(check.is_match(&matching));
            prop_assert!(!check.is_match(&longer));
        }
    }
}
