/// Object keys in storage notifications arrive URL-encoded with `+` for
/// spaces; every consumer wants the decoded form.
pub fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");

    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}
