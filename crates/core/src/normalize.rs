/// Cleans one raw cell into canonical text: the `_x000D_` carriage-return
/// artifact and every control character become spaces, whitespace runs
/// collapse to a single space, and the result is trimmed.
pub fn clean(raw: &str) -> String {
    let replaced = raw.replace("_x000D_", " ");
    let spaced: String = replaced
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
