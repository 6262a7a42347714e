//! Three-tier parameter resolution.
//!
//! Parameters are merged from built-in defaults, the `[defaults]` table of the
//! global config, and per-call overrides, in increasing precedence. The merge
//! works on untyped JSON trees so that unknown keys survive; [`validate`] then
//! coerces the tree into [`EffectiveParams`] and applies the stage's checks.

use crate::config::error::{ConfigError, ConfigResult};
use mdk_protocol::{EffectiveParams, StageName};
use serde_json::{Map, Value};

/// Built-in default parameter tree.
pub fn builtin_defaults() -> Value {
    // Serializing the typed defaults keeps both representations in step.
    serde_json::to_value(EffectiveParams::default())
        .unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Merge the three tiers into one parameter tree.
///
/// Objects merge key by key, recursively. Scalars and arrays from a higher
/// tier replace the lower value wholesale. `null` tiers are ignored. Keys
/// present only in a lower tier are kept. Numbers are copied as-is, so an
/// integer step count stays an integer.
pub fn resolve(base_defaults: &Value, global_config: &Value, call_overrides: &Value) -> Value {
    let mut merged = Value::Object(Map::new());
    deep_merge(&mut merged, base_defaults);
    deep_merge(&mut merged, global_config);
    deep_merge(&mut merged, call_overrides);
    merged
}

fn deep_merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (_, Value::Null) => {}
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Top-level parameter sections a stage reads.
pub fn sections_of(stage: StageName) -> &'static [&'static str] {
    match stage {
        StageName::Prepare => &["system", "run"],
        StageName::Minimize => &["minimization", "run"],
        StageName::Equilibrate => &["equilibration", "run"],
        StageName::Produce => &["production", "run"],
        StageName::Analyze => &[],
    }
}

/// Fold new overrides into a workflow's stored parameter snapshot.
///
/// `frozen` names the top-level sections already consumed by an earlier
/// stage. Inside those, new keys may be added but a value that differs from
/// the consumed one is rejected. Other sections merge freely.
pub fn extend_snapshot(snapshot: &Value, overrides: &Value, frozen: &[&str]) -> ConfigResult<Value> {
    if let (Value::Object(existing), Value::Object(incoming)) = (snapshot, overrides) {
        let mut conflicts = Vec::new();
        for section in frozen {
            if let (Some(current), Some(value)) = (existing.get(*section), incoming.get(*section)) {
                collect_conflicts(current, value, section.to_string(), &mut conflicts);
            }
        }
        if !conflicts.is_empty() {
            return Err(ConfigError::Validation {
                stage: "workflow".to_string(),
                reason: format!(
                    "parameters already consumed by an earlier stage cannot change: {}",
                    conflicts.join(", ")
                ),
            });
        }
    }

    let mut merged = snapshot.clone();
    if merged.is_null() {
        merged = Value::Object(Map::new());
    }
    deep_merge(&mut merged, overrides);
    Ok(merged)
}

fn collect_conflicts(existing: &Value, overlay: &Value, path: String, out: &mut Vec<String>) {
    match (existing, overlay) {
        (_, Value::Null) | (Value::Null, _) => {}
        (Value::Object(existing_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(current) = existing_map.get(key) {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    collect_conflicts(current, value, child, out);
                }
            }
        }
        (current, value) => {
            if !same_value(current, value) {
                out.push(path);
            }
        }
    }
}

// 300 and 300.0 are the same temperature.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Coerce a merged tree into typed parameters and check them for `stage`.
///
/// # Errors
///
/// Returns `ConfigError::Validation` when a value has the wrong type or is
/// out of range for the stage. Nothing is launched before this passes.
pub fn validate(effective_params: &Value, stage: StageName) -> ConfigResult<EffectiveParams> {
    let params: EffectiveParams =
        serde_json::from_value(effective_params.clone()).map_err(|e| invalid(stage, e.to_string()))?;

    match stage {
        StageName::Prepare => {
            let system = &params.system;
            match system.structure_file.as_deref() {
                Some(file) if !file.trim().is_empty() => {}
                _ => return Err(invalid(stage, "system.structure_file is required")),
            }
            positive(stage, "system.box_distance", system.box_distance)?;
            if !(system.ions_concentration >= 0.0) {
                return Err(invalid(stage, "system.ions_concentration must be >= 0"));
            }
            non_empty(stage, "system.force_field", &system.force_field)?;
            non_empty(stage, "system.water_model", &system.water_model)?;
            non_empty(stage, "system.box_type", &system.box_type)?;
        }
        StageName::Minimize => {
            let em = &params.minimization;
            non_empty(stage, "minimization.integrator", &em.integrator)?;
            positive(stage, "minimization.emtol", em.emtol)?;
            positive(stage, "minimization.emstep", em.emstep)?;
            at_least_one(stage, "minimization.nsteps", em.nsteps)?;
        }
        StageName::Equilibrate => {
            let eq = &params.equilibration;
            at_least_one(stage, "equilibration.nvt_steps", eq.nvt_steps)?;
            at_least_one(stage, "equilibration.npt_steps", eq.npt_steps)?;
            positive(stage, "equilibration.temperature", eq.temperature)?;
            positive(stage, "equilibration.pressure", eq.pressure)?;
            positive(stage, "equilibration.dt", eq.dt)?;
        }
        StageName::Produce => {
            let md = &params.production;
            at_least_one(stage, "production.nsteps", md.nsteps)?;
            positive(stage, "production.temperature", md.temperature)?;
            positive(stage, "production.pressure", md.pressure)?;
            positive(stage, "production.dt", md.dt)?;
        }
        StageName::Analyze => {
            let analysis = &params.analysis;
            non_empty(stage, "analysis.selection", &analysis.selection)?;
            non_empty(stage, "analysis.output_prefix", &analysis.output_prefix)?;
            if analysis.output_prefix.contains('/') || analysis.output_prefix.contains("..") {
                return Err(invalid(stage, "analysis.output_prefix must be a plain file prefix"));
            }
            positive(stage, "analysis.dt", analysis.dt)?;
            if !(analysis.begin_time >= 0.0) {
                return Err(invalid(stage, "analysis.begin_time must be >= 0"));
            }
            if analysis.end_time != -1.0 && !(analysis.end_time > analysis.begin_time) {
                return Err(invalid(
                    stage,
                    "analysis.end_time must be -1 or greater than begin_time",
                ));
            }
        }
    }

    Ok(params)
}

fn invalid(stage: StageName, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        stage: stage.to_string(),
        reason: reason.into(),
    }
}

// `!(x > 0.0)` also rejects NaN.
fn positive(stage: StageName, key: &str, value: f64) -> ConfigResult<()> {
    if !(value > 0.0) {
        return Err(invalid(stage, format!("{key} must be > 0, got {value}")));
    }
    Ok(())
}

fn at_least_one(stage: StageName, key: &str, value: u64) -> ConfigResult<()> {
    if value < 1 {
        return Err(invalid(stage, format!("{key} must be >= 1")));
    }
    Ok(())
}

fn non_empty(stage: StageName, key: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(stage, format!("{key} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_precedence_and_pass_through() {
        let base = json!({ "production": { "nsteps": 500000, "dt": 0.002 }, "keep": 1 });
        let global = json!({ "production": { "nsteps": 1000 }, "site": "lab" });
        let call = json!({ "production": { "dt": 0.001 }, "future_flag": true });

        let merged = resolve(&base, &global, &call);

        assert_eq!(merged["production"]["nsteps"], json!(1000));
        assert_eq!(merged["production"]["dt"], json!(0.001));
        assert_eq!(merged["keep"], json!(1));
        assert_eq!(merged["site"], json!("lab"));
        assert_eq!(merged["future_flag"], json!(true));
    }

    #[test]
    fn test_resolve_keeps_integer_types() {
        let merged = resolve(&builtin_defaults(), &Value::Null, &json!({ "minimization": { "nsteps": 10 } }));
        assert!(merged["minimization"]["nsteps"].is_u64());
        assert!(merged["production"]["nsteps"].is_u64());
        assert!(merged["production"]["dt"].is_f64());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let base = builtin_defaults();
        let call = json!({ "system": { "structure_file": "1aki.pdb" } });
        assert_eq!(resolve(&base, &Value::Null, &call), resolve(&base, &Value::Null, &call));
    }

    #[test]
    fn test_scalar_replaces_object() {
        let merged = resolve(&json!({ "a": { "b": 1 } }), &json!({ "a": 5 }), &Value::Null);
        assert_eq!(merged["a"], json!(5));
    }

    #[test]
    fn test_validate_prepare_requires_structure() {
        let merged = resolve(&builtin_defaults(), &Value::Null, &Value::Null);
        let err = validate(&merged, StageName::Prepare).unwrap_err();
        assert!(err.to_string().contains("structure_file"));

        let merged = resolve(
            &builtin_defaults(),
            &Value::Null,
            &json!({ "system": { "structure_file": "1aki.pdb" } }),
        );
        let params = validate(&merged, StageName::Prepare).expect("valid prepare params");
        assert_eq!(params.system.structure_file.as_deref(), Some("1aki.pdb"));
    }

    #[test]
    fn test_validate_rejects_non_positive_values() {
        let cases = [
            (json!({ "equilibration": { "temperature": 0.0 } }), StageName::Equilibrate),
            (json!({ "production": { "dt": -0.002 } }), StageName::Produce),
            (json!({ "minimization": { "nsteps": 0 } }), StageName::Minimize),
            (json!({ "analysis": { "dt": 0 } }), StageName::Analyze),
        ];

        for (overrides, stage) in cases {
            let merged = resolve(&builtin_defaults(), &Value::Null, &overrides);
            assert!(
                matches!(validate(&merged, stage), Err(ConfigError::Validation { .. })),
                "expected validation failure for {overrides}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_wrong_types() {
        let merged = resolve(
            &builtin_defaults(),
            &Value::Null,
            &json!({ "production": { "nsteps": "many" } }),
        );
        assert!(validate(&merged, StageName::Produce).is_err());

        let merged = resolve(
            &builtin_defaults(),
            &Value::Null,
            &json!({ "production": { "nsteps": 10.5 } }),
        );
        assert!(validate(&merged, StageName::Produce).is_err());
    }

    #[test]
    fn test_validate_only_checks_its_stage() {
        let merged = resolve(
            &builtin_defaults(),
            &Value::Null,
            &json!({ "production": { "dt": 0 } }),
        );
        assert!(validate(&merged, StageName::Minimize).is_ok());
        assert!(validate(&merged, StageName::Produce).is_err());
    }

    #[test]
    fn test_analysis_time_window() {
        let merged = resolve(
            &builtin_defaults(),
            &Value::Null,
            &json!({ "analysis": { "begin_time": 100.0, "end_time": 50.0 } }),
        );
        assert!(validate(&merged, StageName::Analyze).is_err());

        let merged = resolve(
            &builtin_defaults(),
            &Value::Null,
            &json!({ "analysis": { "begin_time": 100.0, "end_time": -1 } }),
        );
        assert!(validate(&merged, StageName::Analyze).is_ok());
    }

    #[test]
    fn test_extend_snapshot_unlocked_overrides() {
        let snapshot = json!({ "production": { "nsteps": 100 } });
        let merged = extend_snapshot(&snapshot, &json!({ "production": { "nsteps": 200 } }), &[])
            .expect("unfrozen snapshot accepts changes");
        assert_eq!(merged["production"]["nsteps"], json!(200));
    }

    #[test]
    fn test_extend_snapshot_frozen_allows_additions_only() {
        let snapshot = json!({ "production": { "nsteps": 100, "temperature": 300 } });

        let merged = extend_snapshot(
            &snapshot,
            &json!({ "production": { "temperature": 300.0, "comment": "x" }, "analysis": { "kind": "rmsf" } }),
            &["production"],
        )
        .expect("equal values and new keys are accepted");
        assert_eq!(merged["production"]["comment"], json!("x"));
        assert_eq!(merged["analysis"]["kind"], json!("rmsf"));

        let err = extend_snapshot(&snapshot, &json!({ "production": { "nsteps": 5 } }), &["production"])
            .unwrap_err();
        assert!(err.to_string().contains("production.nsteps"));
    }

    #[test]
    fn test_unconsumed_sections_stay_open() {
        let snapshot = builtin_defaults();
        let frozen: Vec<&str> = sections_of(StageName::Prepare).to_vec();
        let merged = extend_snapshot(&snapshot, &json!({ "production": { "nsteps": 5 } }), &frozen)
            .expect("production was not consumed by prepare");
        assert_eq!(merged["production"]["nsteps"], json!(5));

        assert!(extend_snapshot(&snapshot, &json!({ "run": { "maxwarn": 9 } }), &frozen).is_err());
    }
}
