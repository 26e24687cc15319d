use model::WorkflowTrigger;
use regex::Regex;
use std::sync::LazyLock;

/// `<yyyy>/<mm>/<id>/…` upload layout used by the CMS; the third segment is
/// its asset id.
static KEY_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}/\d{2}/([^/]+)/").unwrap());

pub(crate) fn id_from_key_path(key: &str) -> Option<String> {
    KEY_ID_PATTERN
        .captures(key)
        .map(|captures| captures[1].to_string())
}

/// A `.json` drop is a metadata sidecar, anything else is the video itself.
pub(crate) fn trigger_kind(key: &str) -> WorkflowTrigger {
    match key.rsplit('.').next() {
        Some("json") => WorkflowTrigger::Metadata,
        _ => WorkflowTrigger::Video,
    }
}
