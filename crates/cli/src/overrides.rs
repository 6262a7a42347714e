//! Turns `--params FILE` and `--set key.path=value` into one override tree.

use crate::cli::OverrideArgs;
use color_eyre::eyre::{bail, eyre, Result};
use mdk_core::config::loader::load_params_file;
use serde_json::{Map, Value};

/// Builds the per-call override tier.
///
/// The file is read first and `--set` entries are applied on top of it, in
/// order. Returns `Value::Null` when neither was given.
pub fn collect_overrides(args: &OverrideArgs) -> Result<Value> {
    let mut tree = match &args.params {
        Some(path) => load_params_file(path)?,
        None if args.set.is_empty() => return Ok(Value::Null),
        None => Value::Object(Map::new()),
    };

    for assignment in &args.set {
        let (path, value) = parse_assignment(assignment)?;
        insert_at(&mut tree, &path, value)?;
    }

    Ok(tree)
}

/// Splits `a.b.c=value`. The value is read as JSON when it parses as JSON,
/// otherwise it is taken as a plain string.
fn parse_assignment(assignment: &str) -> Result<(Vec<String>, Value)> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| eyre!("Expected KEY.PATH=VALUE, got '{assignment}'"))?;

    let path: Vec<String> = key.trim().split('.').map(str::to_string).collect();
    if path.iter().any(String::is_empty) {
        bail!("Invalid parameter path '{key}'");
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((path, value))
}

fn insert_at(tree: &mut Value, path: &[String], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        bail!("Empty parameter path");
    };

    let mut node = tree;
    for key in parents {
        let map = node
            .as_object_mut()
            .ok_or_else(|| eyre!("Cannot set '{}': '{key}' is not a table", path.join(".")))?;
        node = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    node.as_object_mut()
        .ok_or_else(|| eyre!("Cannot set '{}': parent is not a table", path.join(".")))?
        .insert(last.clone(), value);
    Ok(())
}
