//! Tests for call rewriting through `Transform::ReplaceCall`.

use std::path::Path;

use omni_refactor::{CallableName, RefactorError, Transform, TransformResult};

fn replace(code: &str, old: &str, new: &str) -> TransformResult {
    let transform = Transform::ReplaceCall {
        old: old.parse().expect("old pattern"),
        new: new.parse().expect("new pattern"),
    };
    transform.transform_source(Path::new("test_api.py"), code)
}

#[test]
fn test_receiver_wildcard_keeps_receivers() {
    let code = "\
class TestApi:
    def test_denied(self):
        response = self.client.get('/admin')
        self.assert_401(response)
        helpers.assert_401(response)
        assert_401(response)
";
    let result = replace(code, "*.assert_401", "*.assert_403");
    assert!(result.error.is_none());
    assert_eq!(
        result.output,
        "\
class TestApi:
    def test_denied(self):
        response = self.client.get('/admin')
        self.assert_403(response)
        helpers.assert_403(response)
        assert_401(response)
"
    );
    assert_eq!(result.edits.len(), 2);
    assert_eq!(result.edits[0].line, 4);
    assert_eq!(result.edits[0].column, 14);
}

#[test]
fn test_attribute_access_is_not_a_call() {
    let code = "handler = self.assert_401\nself.assert_401\n";
    let result = replace(code, "*.assert_401", "*.assert_403");
    assert!(!result.modified);
    assert_eq!(result.output, code);
}

#[test]
fn test_argument_remap_preserves_argument_text() {
    let code = "client.post(url,  {'a': 1})\nclient.post(url)\n";
    let result = replace(code, "*.post(url, data)", "*.post(data, url)");
    assert!(!result.modified);

    let result = replace(code, "*.post(url, {'a': 1})", "*.send({'a': 1}, url)");
    assert_eq!(
        result.output,
        "client.send({'a': 1}, url)\nclient.post(url)\n"
    );
}

#[test]
fn test_ambiguous_sites_reported_and_untouched() {
    let code = "a.m(1)\nb.m(2)\n";
    let result = replace(code, "*.m", "*.n(1)");
    assert!(!result.modified);
    assert_eq!(result.output, code);
    assert_eq!(result.ambiguous.len(), 2);
    assert!(matches!(
        result.error,
        Some(RefactorError::AmbiguousMatch { line: 1, column: 1, .. })
    ));
}

#[test]
fn test_string_and_comment_text_untouched() {
    let code = "obj.old()  # obj.old()\ns = 'obj.old()'\n";
    let result = replace(code, "*.old", "*.new");
    assert_eq!(result.output, "obj.new()  # obj.old()\ns = 'obj.old()'\n");
}

#[test]
fn test_pattern_validation() {
    assert!("*.".parse::<CallableName>().is_err());
    assert!("a.(b)".parse::<CallableName>().is_err());
    let err = "f(".parse::<CallableName>().expect_err("unbalanced");
    assert_eq!(err.kind(), "invalid_pattern");

    let transform = Transform::ReplaceCall {
        old: "f".parse().expect("old"),
        new: "*.g".parse().expect("new"),
    };
    let result = transform.transform_source(Path::new("x.py"), "f()\n");
    assert_eq!(result.error.as_ref().map(RefactorError::kind), Some("invalid_pattern"));
    assert!(!result.modified);
}

#[test]
fn test_transform_serializes_with_kind() {
    let transform = Transform::ReplaceCall {
        old: "*.assert_401".parse().expect("old"),
        new: "*.assert_403".parse().expect("new"),
    };
    let json = serde_json::to_value(&transform).expect("json");
    assert_eq!(json["kind"], "replace_call");
    assert_eq!(json["old"], "*.assert_401");
    assert_eq!(transform.label(), "replace-call *.assert_401 -> *.assert_403");
}
