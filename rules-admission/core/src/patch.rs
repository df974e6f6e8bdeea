use json_patch::{
    jsonptr::{PointerBuf, Token},
    PatchOperation, ReplaceOperation,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Just enough of a rule spec to find label and annotation values, whatever
/// their JSON type.
#[derive(Debug, Default, Deserialize)]
struct RuleGroups {
    #[serde(default)]
    groups: Option<Vec<RawGroup>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGroup {
    #[serde(default)]
    rules: Option<Vec<RawRule>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRule {
    #[serde(default)]
    labels: Option<BTreeMap<String, Value>>,

    #[serde(default)]
    annotations: Option<BTreeMap<String, Value>>,
}

/// Returns `replace` operations that turn every non-string rule label or
/// annotation value in `spec` into its string form.
///
/// Label and annotation values must be strings, but YAML manifests often
/// carry unquoted numbers or booleans there.
pub fn generate_patches(spec: &Value) -> Result<Vec<PatchOperation>, serde_json::Error> {
    let RuleGroups { groups } = RuleGroups::deserialize(spec)?;

    let mut patches = Vec::new();
    for (g, group) in groups.into_iter().flatten().enumerate() {
        for (r, rule) in group.rules.into_iter().flatten().enumerate() {
            for (field, values) in [("labels", rule.labels), ("annotations", rule.annotations)] {
                for (key, value) in values.into_iter().flatten() {
                    if value.is_string() {
                        continue;
                    }
                    let path = PointerBuf::from_tokens([
                        Token::new("spec"),
                        Token::new("groups"),
                        Token::from(g),
                        Token::new("rules"),
                        Token::from(r),
                        Token::new(field),
                        Token::new(key),
                    ]);
                    patches.push(PatchOperation::Replace(ReplaceOperation {
                        path,
                        value: Value::String(stringify(&value)),
                    }));
                }
            }
        }
    }

    Ok(patches)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // Numbers, booleans, and nested values use their JSON text.
        other => other.to_string(),
    }
}
