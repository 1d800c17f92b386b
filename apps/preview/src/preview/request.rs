use serde_json::Value;

/// Template value meaning "the user is looking at the raw uploaded file".
/// Nothing is compiled while it is selected.
pub const UPLOADED_FILE_TEMPLATE: &str = "uploaded_file";

/// Compile this document, with this template, for this page.
/// Built fresh for every issued request and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileRequest {
    pub document: Value,
    pub template_id: String,
    pub page: u32,
}

/// True when a compile may be issued for these inputs.
pub fn is_compilable(document: Option<&Value>, template: Option<&str>) -> bool {
    matches!((document, template), (Some(_), Some(t)) if t != UPLOADED_FILE_TEMPLATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_inputs_are_not_compilable() {
        let doc = json!({"person": {"first_name": "Ada"}});
        assert!(!is_compilable(None, Some("template2")));
        assert!(!is_compilable(Some(&doc), None));
        assert!(!is_compilable(None, None));
    }

    #[test]
    fn test_uploaded_file_template_is_not_compilable() {
        let doc = json!({});
        assert!(!is_compilable(Some(&doc), Some(UPLOADED_FILE_TEMPLATE)));
    }

    #[test]
    fn test_regular_template_is_compilable() {
        let doc = json!({});
        assert!(is_compilable(Some(&doc), Some("template5")));
    }
}
